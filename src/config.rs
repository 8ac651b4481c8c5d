//! Configuration loaded from environment variables

use crate::geo::amenities::DEFAULT_OVERPASS_URL;
use crate::geo::geocode::{DEFAULT_CACHE_SIZE, DEFAULT_NOMINATIM_URL};
use crate::ingestion::fetch::{FetchFilters, DEFAULT_DVF_API_URL};
use crate::ingestion::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use anyhow::{Context, Result};
use chrono::{Datelike, Duration as ChronoDuration, NaiveDate};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Average month length used to turn a period in months into a start date
pub const DEFAULT_DAYS_PER_MONTH: f64 = 30.44;

#[derive(Debug, Clone)]
pub struct Config {
    pub dvf_api_url: String,
    pub nominatim_url: String,
    pub overpass_url: String,
    pub http_timeout: Duration,
    pub max_fetch_attempts: u32,
    pub period_months: u32,
    pub days_per_month: f64,
    pub min_transaction_value: u32,
    pub min_built_area: u32,
    pub search_radius_meters: u32,
    pub geocode_cache_size: usize,
    pub bind_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dvf_api_url: DEFAULT_DVF_API_URL.to_string(),
            nominatim_url: DEFAULT_NOMINATIM_URL.to_string(),
            overpass_url: DEFAULT_OVERPASS_URL.to_string(),
            http_timeout: Duration::from_secs(30),
            max_fetch_attempts: DEFAULT_MAX_ATTEMPTS,
            period_months: 24,
            days_per_month: DEFAULT_DAYS_PER_MONTH,
            min_transaction_value: 10_000,
            min_built_area: 10,
            search_radius_meters: 350,
            geocode_cache_size: DEFAULT_CACHE_SIZE,
            bind_addr: "127.0.0.1:3001".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        Ok(Config {
            dvf_api_url: env::var("DVF_API_URL").unwrap_or(defaults.dvf_api_url),
            nominatim_url: env::var("NOMINATIM_URL").unwrap_or(defaults.nominatim_url),
            overpass_url: env::var("OVERPASS_URL").unwrap_or(defaults.overpass_url),
            http_timeout: Duration::from_secs(parse_var(
                "HTTP_TIMEOUT_SECS",
                defaults.http_timeout.as_secs(),
            )?),
            max_fetch_attempts: parse_var("MAX_FETCH_ATTEMPTS", defaults.max_fetch_attempts)?,
            period_months: parse_var("PERIOD_MONTHS", defaults.period_months)?,
            days_per_month: check_days_per_month(parse_var(
                "DAYS_PER_MONTH",
                defaults.days_per_month,
            )?)?,
            min_transaction_value: parse_var(
                "MIN_TRANSACTION_VALUE",
                defaults.min_transaction_value,
            )?,
            min_built_area: parse_var("MIN_BUILT_AREA", defaults.min_built_area)?,
            search_radius_meters: parse_var("SEARCH_RADIUS_METERS", defaults.search_radius_meters)?,
            geocode_cache_size: parse_var("GEOCODE_CACHE_SIZE", defaults.geocode_cache_size)?,
            bind_addr: env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_fetch_attempts)
    }

    pub fn fetch_filters(&self) -> FetchFilters {
        FetchFilters {
            min_value: self.min_transaction_value,
            min_built_area: self.min_built_area,
            ..FetchFilters::default()
        }
    }

    /// Minimum mutation year for an analysis period ending `today`
    pub fn min_year(&self, today: NaiveDate, period_months: u32) -> i32 {
        min_year_for_period(today, period_months, self.days_per_month)
    }
}

/// Year of `today - months * days_per_month` days.
/// A NaN or negative span counts as zero; a span past the calendar range yields `NaiveDate::MIN`.
pub fn min_year_for_period(today: NaiveDate, months: u32, days_per_month: f64) -> i32 {
    let days = (months as f64 * days_per_month).max(0.0) as i64;
    ChronoDuration::try_days(days)
        .and_then(|span| today.checked_sub_signed(span))
        .unwrap_or(NaiveDate::MIN)
        .year()
}

fn check_days_per_month(value: f64) -> Result<f64> {
    if !value.is_finite() || value <= 0.0 {
        anyhow::bail!("DAYS_PER_MONTH must be a positive number, got {}", value);
    }
    Ok(value)
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number, got '{}'", name, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_year_default_period() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        // 24 * 30.44 = 730 days back
        assert_eq!(min_year_for_period(today, 24, DEFAULT_DAYS_PER_MONTH), 2022);
    }

    #[test]
    fn test_min_year_crosses_year_boundary() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        assert_eq!(min_year_for_period(today, 1, DEFAULT_DAYS_PER_MONTH), 2023);
        assert_eq!(min_year_for_period(today, 0, DEFAULT_DAYS_PER_MONTH), 2024);
    }

    #[test]
    fn test_min_year_extreme_spans_do_not_panic() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        assert_eq!(min_year_for_period(today, u32::MAX, f64::MAX), NaiveDate::MIN.year());
        assert_eq!(
            min_year_for_period(today, u32::MAX, f64::INFINITY),
            NaiveDate::MIN.year()
        );
        assert_eq!(min_year_for_period(today, u32::MAX, 1e9), NaiveDate::MIN.year());
        assert_eq!(min_year_for_period(today, 12, f64::NAN), 2024);
        assert_eq!(min_year_for_period(today, 12, -30.0), 2024);
    }

    #[test]
    fn test_days_per_month_must_be_positive_and_finite() {
        assert_eq!(check_days_per_month(30.44).unwrap(), 30.44);
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(check_days_per_month(bad).is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_config_derived_values() {
        let config = Config {
            min_transaction_value: 50_000,
            max_fetch_attempts: 5,
            ..Config::default()
        };

        let filters = config.fetch_filters();
        assert_eq!(filters.min_value, 50_000);
        assert_eq!(filters.min_built_area, 10);
        assert_eq!(config.retry_policy().max_attempts(), 5);
    }
}
