//! Fixed-size bounding box around a point

use crate::ingestion::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Half-width of the box on each axis, in degrees.
/// The DVF API rejects boxes larger than 0.02° × 0.02° with HTTP 403.
pub const HALF_WIDTH_DEG: f64 = 0.0025;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Geographic filter in `lonMin,latMin,lonMax,latMax` order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lon_min: f64,
    pub lat_min: f64,
    pub lon_max: f64,
    pub lat_max: f64,
}

impl BoundingBox {
    /// A 0.005° × 0.005° box centered on `center`, bounds rounded to 6 decimals
    pub fn around(center: Coordinates) -> Self {
        let bbox = BoundingBox {
            lon_min: round6(center.longitude - HALF_WIDTH_DEG),
            lat_min: round6(center.latitude - HALF_WIDTH_DEG),
            lon_max: round6(center.longitude + HALF_WIDTH_DEG),
            lat_max: round6(center.latitude + HALF_WIDTH_DEG),
        };
        info!("Generated bounding box: {}", bbox);
        bbox
    }

    pub fn validate(&self) -> Result<()> {
        let bounds = [self.lon_min, self.lat_min, self.lon_max, self.lat_max];
        if bounds.iter().any(|b| !b.is_finite()) {
            return Err(IngestError::Validation(format!(
                "bounding box has non-finite bounds: {:?}",
                bounds
            )));
        }
        if self.lon_min >= self.lon_max || self.lat_min >= self.lat_max {
            return Err(IngestError::Validation(format!(
                "bounding box is empty or inverted: {}",
                self
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.lon_min, self.lat_min, self.lon_max, self.lat_max
        )
    }
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}
