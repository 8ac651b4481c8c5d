//! Utility functions for common operations

use crate::ingestion::error::Result;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

pub const USER_AGENT: &str = concat!("dvf-market-analysis/", env!("CARGO_PKG_VERSION"));

/// Build an HTTP client with a fixed per-request timeout
pub fn http_client(timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}

/// Why a JSON value could not be coerced to a number
#[derive(Debug, Clone, PartialEq)]
pub enum CoercionError {
    NotNumeric(String),
    Negative(f64),
}

impl std::fmt::Display for CoercionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoercionError::NotNumeric(v) => write!(f, "not a number: {}", v),
            CoercionError::Negative(v) => write!(f, "negative value: {}", v),
        }
    }
}

/// Coerce an optional JSON value to a non-negative float.
/// Absent values and empty strings default to 0.0.
pub fn coerce_amount(value: Option<&Value>) -> std::result::Result<f64, CoercionError> {
    let parsed = match value {
        None => return Ok(0.0),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        Some(_) => None,
    };

    match parsed {
        Some(f) if f < 0.0 => Err(CoercionError::Negative(f)),
        Some(f) => Ok(f),
        None => Err(CoercionError::NotNumeric(display_value(value))),
    }
}

/// Coerce an optional JSON value to a year. Absent values default to 0.
pub fn coerce_year(value: Option<&Value>) -> std::result::Result<i32, CoercionError> {
    let parsed = match value {
        None => return Ok(0),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .and_then(|i| i32::try_from(i).ok()),
        Some(Value::String(s)) => s.trim().parse::<i32>().ok(),
        Some(_) => None,
    };

    parsed.ok_or_else(|| CoercionError::NotNumeric(display_value(value)))
}

/// Lenient count: anything missing or non-numeric becomes 0
pub fn coerce_count(value: Option<&Value>) -> u32 {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .map(|c| c.min(u32::MAX as u64) as u32)
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse::<u32>().unwrap_or(0),
        _ => 0,
    }
}

/// Truthiness of a flag field
pub fn coerce_flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "t" | "1" | "yes" | "oui"
        ),
        _ => false,
    }
}

/// Scalar JSON value as a string; objects and arrays are not text
pub fn text(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    }
}

/// JSON array of scalars as strings, preserving order
pub fn text_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(|v| text(Some(v))).collect(),
        _ => Vec::new(),
    }
}

/// Round to 2 decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn display_value(value: Option<&Value>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce_amount() {
        assert_eq!(coerce_amount(None), Ok(0.0));
        assert_eq!(coerce_amount(Some(&json!(250000))), Ok(250000.0));
        assert_eq!(coerce_amount(Some(&json!("1234.50"))), Ok(1234.5));
        assert_eq!(coerce_amount(Some(&json!(""))), Ok(0.0));
        assert!(matches!(
            coerce_amount(Some(&json!("abc"))),
            Err(CoercionError::NotNumeric(_))
        ));
        assert!(matches!(
            coerce_amount(Some(&json!([1, 2]))),
            Err(CoercionError::NotNumeric(_))
        ));
        assert_eq!(
            coerce_amount(Some(&json!(-5.0))),
            Err(CoercionError::Negative(-5.0))
        );
    }

    #[test]
    fn test_coerce_year() {
        assert_eq!(coerce_year(None), Ok(0));
        assert_eq!(coerce_year(Some(&json!(2023))), Ok(2023));
        assert_eq!(coerce_year(Some(&json!("2021"))), Ok(2021));
        assert_eq!(coerce_year(Some(&json!(2022.0))), Ok(2022));
        assert!(coerce_year(Some(&json!(2022.5))).is_err());
        assert!(coerce_year(Some(&json!("twenty"))).is_err());
    }

    #[test]
    fn test_coerce_count_is_lenient() {
        assert_eq!(coerce_count(Some(&json!(3))), 3);
        assert_eq!(coerce_count(Some(&json!("2"))), 2);
        assert_eq!(coerce_count(Some(&json!("n/a"))), 0);
        assert_eq!(coerce_count(Some(&json!(-1))), 0);
        assert_eq!(coerce_count(None), 0);
    }

    #[test]
    fn test_coerce_flag() {
        assert!(coerce_flag(Some(&json!(true))));
        assert!(coerce_flag(Some(&json!(1))));
        assert!(coerce_flag(Some(&json!("True"))));
        assert!(!coerce_flag(Some(&json!(false))));
        assert!(!coerce_flag(Some(&json!("false"))));
        assert!(!coerce_flag(None));
    }

    #[test]
    fn test_text_list() {
        assert_eq!(
            text_list(Some(&json!(["75101", 75102, null]))),
            vec!["75101".to_string(), "75102".to_string()]
        );
        assert!(text_list(Some(&json!("75101"))).is_empty());
        assert!(text_list(None).is_empty());
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(3333.33333), 3333.33);
        assert_eq!(round2(2500.0), 2500.0);
    }
}
