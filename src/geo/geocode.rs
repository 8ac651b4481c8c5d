//! Address geocoding through Nominatim, memoized in a bounded cache

use crate::geo::bbox::Coordinates;
use crate::ingestion::error::{IngestError, Result};
use crate::ingestion::utils::http_client;
use moka::future::Cache;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";
pub const DEFAULT_CACHE_SIZE: usize = 128;

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

/// Geocoding client
pub struct Geocoder {
    http: Client,
    base_url: String,
    cache: Cache<String, Coordinates>,
}

impl Geocoder {
    pub fn new(base_url: &str, timeout: Duration, cache_size: usize) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: base_url.to_string(),
            cache: Cache::builder().max_capacity(cache_size.max(1) as u64).build(),
        })
    }

    /// Resolve an address to coordinates; `NotFound` when nothing matches
    pub async fn locate(&self, address: &str) -> Result<Coordinates> {
        let address = address.trim();
        if address.is_empty() {
            return Err(IngestError::Validation("address cannot be empty".to_string()));
        }

        if let Some(coords) = self.cache.get(address).await {
            debug!("Geocode cache hit for '{}'", address);
            return Ok(coords);
        }

        let response = self
            .http
            .get(&self.base_url)
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::Http {
                status: status.as_u16(),
                url: self.base_url.clone(),
            });
        }

        let places: Vec<NominatimPlace> = response.json().await?;
        let coords = first_match(&places)
            .ok_or_else(|| IngestError::NotFound(format!("unable to geocode address: {}", address)))?;

        info!(
            "Coordinates found for '{}': {}, {}",
            address, coords.latitude, coords.longitude
        );
        self.cache.insert(address.to_string(), coords).await;
        Ok(coords)
    }
}

fn first_match(places: &[NominatimPlace]) -> Option<Coordinates> {
    let place = places.first()?;
    Some(Coordinates {
        latitude: place.lat.trim().parse().ok()?,
        longitude: place.lon.trim().parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coords(lat: f64) -> Coordinates {
        Coordinates {
            latitude: lat,
            longitude: 2.35,
        }
    }

    // Nothing listens on the discard port, so any request would fail
    fn offline_geocoder(cache_size: usize) -> Geocoder {
        Geocoder::new("http://127.0.0.1:9/search", Duration::from_millis(200), cache_size).unwrap()
    }

    #[tokio::test]
    async fn test_cached_address_skips_lookup() {
        let geocoder = offline_geocoder(4);
        geocoder
            .cache
            .insert("10 rue de Rivoli, Paris".to_string(), coords(48.85))
            .await;

        let found = geocoder.locate("  10 rue de Rivoli, Paris ").await.unwrap();
        assert_eq!(found, coords(48.85));
    }

    #[tokio::test]
    async fn test_cache_miss_goes_to_network() {
        let geocoder = offline_geocoder(4);
        let err = geocoder.locate("1 place du Capitole").await.unwrap_err();
        assert!(matches!(err, IngestError::Network(_)));
    }

    #[tokio::test]
    async fn test_cache_overwrite_keeps_latest() {
        let geocoder = offline_geocoder(2);
        geocoder.cache.insert("a".to_string(), coords(1.0)).await;
        geocoder.cache.insert("a".to_string(), coords(5.0)).await;
        geocoder.cache.run_pending_tasks().await;

        assert_eq!(geocoder.cache.entry_count(), 1);
        assert_eq!(geocoder.cache.get("a").await, Some(coords(5.0)));
    }

    #[tokio::test]
    async fn test_cache_is_bounded() {
        let geocoder = offline_geocoder(2);
        for (i, address) in ["a", "b", "c", "d"].iter().enumerate() {
            geocoder.cache.insert(address.to_string(), coords(i as f64)).await;
        }
        geocoder.cache.run_pending_tasks().await;

        assert!(geocoder.cache.entry_count() <= 2);
    }

    #[test]
    fn test_first_match() {
        let places: Vec<NominatimPlace> = serde_json::from_str(
            r#"[{"lat": "48.8566", "lon": "2.3522", "display_name": "Paris"}]"#,
        )
        .unwrap();
        assert_eq!(
            first_match(&places),
            Some(Coordinates {
                latitude: 48.8566,
                longitude: 2.3522
            })
        );
        assert!(first_match(&[]).is_none());
    }

    #[tokio::test]
    async fn test_empty_address_is_rejected() {
        let geocoder = Geocoder::new(DEFAULT_NOMINATIM_URL, Duration::from_secs(5), 4).unwrap();
        let err = geocoder.locate("   ").await.unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
    }
}
