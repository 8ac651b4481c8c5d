// Library module for testable functions

pub mod config;
pub mod geo;
pub mod ingestion;

use ingestion::utils::round2;

/// Price per square meter, rounded to cents
/// Formula: value / area, only when both are positive
pub fn price_per_area(value: f64, area: f64) -> Option<f64> {
    if value <= 0.0 || area <= 0.0 {
        return None;
    }
    Some(round2(value / area))
}
