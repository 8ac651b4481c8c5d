//! Nearby named points of interest through the Overpass API

use crate::geo::bbox::Coordinates;
use crate::ingestion::error::{IngestError, Result};
use crate::ingestion::utils::http_client;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;
use tracing::{error, info};

pub const DEFAULT_OVERPASS_URL: &str = "http://overpass-api.de/api/interpreter";

/// Tag keys checked, in order, when assigning a place to a category
const CATEGORY_KEYS: [&str; 7] = [
    "amenity",
    "shop",
    "office",
    "healthcare",
    "highway",
    "railway",
    "aeroway",
];

pub type Tag = (&'static str, &'static str);

pub const CULTURAL_AND_EDUCATIONAL: &[Tag] = &[
    ("amenity", "school"),
    ("amenity", "college"),
    ("amenity", "university"),
    ("amenity", "training"),
    ("amenity", "library"),
    ("amenity", "music_school"),
    ("amenity", "arts_centre"),
    ("amenity", "theatre"),
    ("amenity", "cinema"),
    ("amenity", "community_centre"),
    ("amenity", "public_bookcase"),
    ("amenity", "concert_hall"),
    ("amenity", "gymnasium"),
    ("amenity", "sports_centre"),
    ("amenity", "stadium"),
    ("amenity", "dance"),
    ("amenity", "planetarium"),
    ("amenity", "museum"),
    ("amenity", "gallery"),
];

pub const TRANSPORT: &[Tag] = &[
    ("amenity", "bus_station"),
    ("highway", "bus_stop"),
    ("amenity", "taxi"),
    ("amenity", "ferry_terminal"),
    ("amenity", "parking"),
    ("amenity", "bicycle_parking"),
    ("amenity", "bicycle_rental"),
    ("amenity", "car_rental"),
    ("amenity", "car_sharing"),
    ("amenity", "charging_station"),
    ("amenity", "fuel"),
    ("railway", "station"),
    ("railway", "tram_stop"),
    ("railway", "halt"),
    ("railway", "subway_entrance"),
    ("railway", "light_rail"),
    ("aeroway", "aerodrome"),
    ("aeroway", "helipad"),
];

pub const FOOD_AND_DRINK: &[Tag] = &[
    ("amenity", "restaurant"),
    ("amenity", "cafe"),
    ("amenity", "fast_food"),
    ("amenity", "pub"),
    ("amenity", "bar"),
    ("amenity", "biergarten"),
    ("amenity", "food_court"),
    ("amenity", "ice_cream"),
    ("amenity", "juice_bar"),
    ("shop", "bakery"),
    ("shop", "butcher"),
    ("shop", "cheese"),
    ("shop", "chocolate"),
    ("shop", "confectionery"),
    ("shop", "deli"),
    ("shop", "greengrocer"),
    ("shop", "pastry"),
    ("shop", "seafood"),
    ("shop", "tea"),
    ("shop", "wine"),
    ("amenity", "nightclub"),
    ("amenity", "caterer"),
];

pub const HEALTHCARE: &[Tag] = &[
    ("amenity", "hospital"),
    ("amenity", "clinic"),
    ("amenity", "pharmacy"),
    ("amenity", "laboratory"),
    ("amenity", "doctors"),
    ("amenity", "medical_centre"),
    ("amenity", "dentist"),
    ("amenity", "veterinary"),
    ("amenity", "optician"),
    ("amenity", "physiotherapist"),
    ("healthcare", "blood_donation"),
    ("healthcare", "alternative"),
    ("healthcare", "audiologist"),
    ("healthcare", "speech_therapist"),
    ("healthcare", "psychotherapist"),
    ("healthcare", "nutrition_counselling"),
    ("healthcare", "podiatrist"),
];

pub const BUSINESS_AND_FINANCE: &[Tag] = &[
    ("amenity", "bank"),
    ("amenity", "atm"),
    ("amenity", "bureau_de_change"),
    ("office", "company"),
    ("office", "financial"),
    ("office", "insurance"),
    ("amenity", "conference_centre"),
    ("amenity", "business_centre"),
    ("amenity", "marketplace"),
];

/// Display name and tag list of every searched category
pub const CATEGORIES: [(&str, &[Tag]); 5] = [
    ("Cultural and Educational", CULTURAL_AND_EDUCATIONAL),
    ("Transport", TRANSPORT),
    ("Food and Drink", FOOD_AND_DRINK),
    ("Healthcare", HEALTHCARE),
    ("Business and Finance", BUSINESS_AND_FINANCE),
];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OverpassResponse {
    #[serde(default)]
    pub elements: Vec<OverpassElement>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OverpassElement {
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

/// One named place, ready for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Amenity {
    pub category: String,
    pub kind: String,
    pub name: String,
}

/// Build an Overpass QL query for `tags` within `radius` meters of `center`
pub fn build_query(tags: &[Tag], center: Coordinates, radius: u32) -> Result<String> {
    if tags.is_empty() {
        return Err(IngestError::Validation(
            "amenities list cannot be empty".to_string(),
        ));
    }

    let mut parts = vec!["[out:json];".to_string(), "(".to_string()];
    for (key, value) in tags {
        parts.push(format!(
            "node[\"{}\"=\"{}\"](around:{},{},{});",
            key, value, radius, center.latitude, center.longitude
        ));
    }
    parts.push(");".to_string());
    parts.push("out;".to_string());
    Ok(parts.join("\n"))
}

/// Group named places by `key:value`, deduplicating names.
/// Each place lands in the first category key it carries.
pub fn categorize_places(response: &OverpassResponse) -> BTreeMap<String, BTreeSet<String>> {
    let mut categorized: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for element in &response.elements {
        let name = match element.tags.get("name") {
            Some(name) if !name.is_empty() => name,
            _ => continue,
        };

        let category = CATEGORY_KEYS
            .iter()
            .find_map(|key| element.tags.get(*key).map(|value| format!("{}:{}", key, value)));

        if let Some(category) = category {
            categorized.entry(category).or_default().insert(name.clone());
        }
    }

    categorized
}

/// Flatten categorized places into display rows, names sorted per category
pub fn amenity_rows(category: &str, places: &BTreeMap<String, BTreeSet<String>>) -> Vec<Amenity> {
    places
        .iter()
        .flat_map(|(key, names)| {
            let kind = capitalize(key.split_once(':').map(|(_, v)| v).unwrap_or(key));
            names.iter().map(move |name| Amenity {
                category: category.to_string(),
                kind: kind.clone(),
                name: name.clone(),
            })
        })
        .collect()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}

/// Overpass API client
pub struct AmenityClient {
    http: Client,
    base_url: String,
}

impl AmenityClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: base_url.to_string(),
        })
    }

    pub async fn search(&self, tags: &[Tag], center: Coordinates, radius: u32) -> Result<OverpassResponse> {
        let query = build_query(tags, center, radius)?;
        let response = self
            .http
            .get(&self.base_url)
            .query(&[("data", query.as_str())])
            .send()
            .await
            .map_err(|e| {
                error!("Overpass API request failed: {}", e);
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::Http {
                status: status.as_u16(),
                url: self.base_url.clone(),
            });
        }
        Ok(response.json().await?)
    }

    /// Search every predefined category and return display rows
    pub async fn nearby(&self, center: Coordinates, radius: u32) -> Result<Vec<Amenity>> {
        let mut rows = Vec::new();
        for (category, tags) in CATEGORIES {
            let response = self.search(tags, center, radius).await?;
            rows.extend(amenity_rows(category, &categorize_places(&response)));
        }
        info!("Found {} named amenities within {}m", rows.len(), radius);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn center() -> Coordinates {
        Coordinates {
            latitude: 48.8566,
            longitude: 2.3522,
        }
    }

    #[test]
    fn test_build_query() {
        let query = build_query(&[("amenity", "cafe"), ("shop", "bakery")], center(), 350).unwrap();

        assert_eq!(
            query,
            "[out:json];\n(\n\
             node[\"amenity\"=\"cafe\"](around:350,48.8566,2.3522);\n\
             node[\"shop\"=\"bakery\"](around:350,48.8566,2.3522);\n\
             );\nout;"
        );
    }

    #[test]
    fn test_build_query_requires_tags() {
        assert!(matches!(
            build_query(&[], center(), 350),
            Err(IngestError::Validation(_))
        ));
    }

    #[test]
    fn test_categorize_deduplicates_named_places() {
        let response: OverpassResponse = serde_json::from_str(
            r#"{"elements": [
                {"tags": {"name": "Café de Flore", "amenity": "cafe"}},
                {"tags": {"name": "Café de Flore", "amenity": "cafe"}},
                {"tags": {"name": "Les Deux Magots", "amenity": "cafe"}},
                {"tags": {"amenity": "bench"}},
                {"tags": {"name": "Poilâne", "shop": "bakery", "amenity": "cafe"}},
                {"tags": {"name": "Saint-Germain-des-Prés", "railway": "station"}},
                {}
            ]}"#,
        )
        .unwrap();

        let categorized = categorize_places(&response);

        assert_eq!(categorized.len(), 2);
        let cafes: Vec<&str> = categorized["amenity:cafe"].iter().map(String::as_str).collect();
        assert_eq!(cafes, vec!["Café de Flore", "Les Deux Magots", "Poilâne"]);
        assert!(categorized["railway:station"].contains("Saint-Germain-des-Prés"));
    }

    #[test]
    fn test_amenity_rows() {
        let mut places = BTreeMap::new();
        places.insert(
            "railway:subway_entrance".to_string(),
            BTreeSet::from(["Odéon".to_string()]),
        );

        let rows = amenity_rows("Transport", &places);

        assert_eq!(
            rows,
            vec![Amenity {
                category: "Transport".to_string(),
                kind: "Subway_entrance".to_string(),
                name: "Odéon".to_string(),
            }]
        );
    }
}
