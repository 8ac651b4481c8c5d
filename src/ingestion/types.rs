//! Core data types for the ingestion pipeline
//! Pure data structures with no behavior

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw mutation payload as returned by the DVF API.
/// Every field may be absent, null, or of an unexpected JSON type.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RawTransaction(pub Map<String, Value>);

impl RawTransaction {
    /// Field lookup; JSON `null` is reported as absent
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    /// Identifier used in log messages
    pub fn label(&self) -> String {
        match self.get("idmutation") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "unknown".to_string(),
        }
    }
}

impl From<Value> for RawTransaction {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => RawTransaction(map),
            _ => RawTransaction::default(),
        }
    }
}

/// One page of the cursor-linked mutation listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub results: Vec<RawTransaction>,
    #[serde(default)]
    pub next: Option<String>,
}

/// A page request: either the filtered initial query or a server-supplied cursor
#[derive(Debug, Clone, PartialEq)]
pub enum PageRequest {
    Initial {
        url: String,
        params: Vec<(String, String)>,
    },
    Next(String),
}

impl PageRequest {
    pub fn url(&self) -> &str {
        match self {
            PageRequest::Initial { url, .. } => url,
            PageRequest::Next(url) => url,
        }
    }
}

/// Validated, typed projection of a raw mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTransaction {
    // Identification
    pub id: String,
    pub date: Option<String>,
    pub year: i32,

    // Geography
    pub department_code: Option<String>,
    pub insee_codes: Vec<String>,
    pub commune_count: u32,

    // Financial data
    pub land_value: f64,
    pub land_area: f64,
    pub built_area: f64,
    pub price_per_built_area: Option<f64>,
    pub price_per_land_area: Option<f64>,

    // Property type
    pub property_type_code: Option<String>,
    pub property_type_label: Option<String>,

    // Nature of the mutation
    pub mutation_nature: Option<String>,
    pub is_vefa: bool,

    // Parcels
    pub parcel_count: u32,
    pub mutated_parcel_count: u32,
    pub parcel_ids: Vec<String>,
    pub mutated_parcel_ids: Vec<String>,

    // Volumes and premises
    pub volume_count: u32,
    pub local_count: u32,
    pub local_ids: Vec<String>,
}

impl NormalizedTransaction {
    /// True when the record contributes to price statistics
    pub fn has_valid_price(&self) -> bool {
        matches!(self.price_per_built_area, Some(p) if p > 0.0)
    }

    pub fn has_valid_land_price(&self) -> bool {
        matches!(self.price_per_land_area, Some(p) if p > 0.0)
    }
}

/// Location details of a single mutation, looked up by identifier
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MutationLocation {
    pub mutation_id: Option<String>,
    pub parcel_ids: Vec<String>,
    pub mutated_parcel_ids: Vec<String>,
    pub cadastral_sections: Vec<String>,
    pub mutation_date: Option<String>,
    pub mutation_year: Option<i32>,
    pub department_code: Option<String>,
    pub insee_codes: Vec<String>,
    pub property_type: Option<String>,
    pub land_value: Option<f64>,
    pub built_area: Option<f64>,
    pub land_area: Option<f64>,
}

/// Refinement statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefineStats {
    pub refined: usize,
    pub skipped: usize,
}

impl std::fmt::Display for RefineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "refined: {}, skipped: {}", self.refined, self.skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_transaction_null_is_absent() {
        let raw = RawTransaction::from(json!({"idmutation": 42, "datemut": null}));

        assert!(raw.get("datemut").is_none());
        assert!(raw.get("missing").is_none());
        assert_eq!(raw.label(), "42");
    }

    #[test]
    fn test_page_without_next() {
        let page: Page = serde_json::from_value(json!({"count": 1, "results": [{"idmutation": "a"}]}))
            .unwrap();

        assert_eq!(page.results.len(), 1);
        assert!(page.next.is_none());
    }

    #[test]
    fn test_refine_stats_display() {
        let stats = RefineStats {
            refined: 8,
            skipped: 2,
        };
        assert_eq!(stats.to_string(), "refined: 8, skipped: 2");
    }
}
