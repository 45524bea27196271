//! SerpAPI Client
//!
//! Secondary places provider using the SerpAPI `google_maps` engine. Results
//! come back under `local_results`; each entry is normalized into a [`Place`].

use async_trait::async_trait;
use serde_json::Value;
use serpapi_search_rust::serp_api_search::SerpApiSearch;
use std::collections::HashMap;
use tracing::{debug, info};

use super::{Place, PlaceQuery, PlaceSearch, SearchError};
use crate::config::PlacesConfig;

/// SerpAPI client for Google Maps local results
pub struct SerpApiClient {
    api_key: String,
    max_results: usize,
}

impl SerpApiClient {
    /// Create a new SerpAPI client
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            max_results: 10,
        }
    }

    /// Configure client from config
    pub fn from_config(config: &PlacesConfig) -> Option<Self> {
        if config.serpapi_key.is_empty() {
            return None;
        }

        Some(Self {
            api_key: config.serpapi_key.clone(),
            max_results: config.max_results.max(1) * 2,
        })
    }

    /// Set maximum results per search
    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }
}

/// Map SerpAPI's `$`..`$$$$` price strings onto the 0-4 scale
fn price_level(price: &str) -> Option<u8> {
    let dollars = price.chars().filter(|c| *c == '$' || *c == '₫').count();
    if dollars == 0 {
        None
    } else {
        Some(dollars.min(4) as u8)
    }
}

fn parse_local_result(result: &Value) -> Option<Place> {
    let name = result
        .get("title")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())?
        .to_string();

    let address = result
        .get("address")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let coordinates = result.get("gps_coordinates");
    let latitude = coordinates
        .and_then(|c| c.get("latitude"))
        .and_then(|v| v.as_f64());
    let longitude = coordinates
        .and_then(|c| c.get("longitude"))
        .and_then(|v| v.as_f64());

    let types = match result.get("types").and_then(|v| v.as_array()) {
        Some(types) => types
            .iter()
            .filter_map(|t| t.as_str().map(String::from))
            .collect(),
        None => result
            .get("type")
            .and_then(|v| v.as_str())
            .map(|t| vec![t.to_string()])
            .unwrap_or_default(),
    };

    Some(Place {
        name,
        address,
        latitude,
        longitude,
        rating: result.get("rating").and_then(|v| v.as_f64()).map(|r| r as f32),
        review_count: result
            .get("reviews")
            .and_then(|v| v.as_u64())
            .map(|n| n as u32),
        price_level: result.get("price").and_then(|v| v.as_str()).and_then(price_level),
        types,
        place_id: result
            .get("place_id")
            .and_then(|v| v.as_str())
            .map(String::from),
        image_url: result
            .get("thumbnail")
            .and_then(|v| v.as_str())
            .map(String::from),
        source: "serpapi".to_string(),
        price_per_night: None,
        currency: None,
        booking_url: None,
    })
}

/// Parse a raw `google_maps` engine response
pub(crate) fn parse_local_results(results: &Value, limit: usize) -> Result<Vec<Place>, SearchError> {
    if let Some(error) = results.get("error").and_then(|v| v.as_str()) {
        // SerpAPI reports "no results" through the error field
        if error.contains("hasn't returned any results") {
            return Ok(Vec::new());
        }
        if error.contains("run out of searches") || error.contains("rate") {
            return Err(SearchError::RateLimited("serpapi".to_string()));
        }
        return Err(SearchError::RequestFailed(error.to_string()));
    }

    let Some(local_results) = results.get("local_results") else {
        return Ok(Vec::new());
    };

    let results_array = local_results
        .as_array()
        .ok_or_else(|| SearchError::ParseError("Expected array of local results".to_string()))?;

    Ok(results_array
        .iter()
        .filter_map(parse_local_result)
        .take(limit)
        .collect())
}

#[async_trait]
impl PlaceSearch for SerpApiClient {
    fn name(&self) -> &'static str {
        "serpapi"
    }

    async fn search(&self, query: &PlaceQuery) -> Result<Vec<Place>, SearchError> {
        if self.api_key.is_empty() {
            return Err(SearchError::NoApiKey);
        }

        let text = query.text();
        info!(query = %text, "Searching Google Maps via SerpAPI");

        let mut params = HashMap::<String, String>::new();
        params.insert("engine".to_string(), "google_maps".to_string());
        params.insert("type".to_string(), "search".to_string());
        params.insert("q".to_string(), text);
        params.insert("hl".to_string(), query.language.clone());

        let search = SerpApiSearch::google(params, self.api_key.clone());

        let results = search
            .json()
            .await
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;

        debug!("Raw Google Maps response received");

        parse_local_results(&results, query.limit.min(self.max_results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_price_level() {
        assert_eq!(price_level("$$"), Some(2));
        assert_eq!(price_level("$$$$$"), Some(4));
        assert_eq!(price_level("₫₫"), Some(2));
        assert_eq!(price_level("cheap"), None);
    }

    #[test]
    fn test_parse_local_results() {
        let raw = json!({
            "local_results": [
                {
                    "title": "Bún Chả Hương Liên",
                    "address": "24 Lê Văn Hưu, Hà Nội",
                    "gps_coordinates": {"latitude": 21.018, "longitude": 105.853},
                    "rating": 4.3,
                    "reviews": 5123,
                    "price": "₫",
                    "type": "Vietnamese restaurant",
                    "thumbnail": "https://example.com/t.jpg"
                },
                {"address": "missing title"},
                {"title": "Phở Thìn", "types": ["Pho restaurant", "Restaurant"]}
            ]
        });

        let places = parse_local_results(&raw, 10).unwrap();
        assert_eq!(places.len(), 2);
        assert_eq!(places[0].review_count, Some(5123));
        assert_eq!(places[0].types, vec!["Vietnamese restaurant".to_string()]);
        assert_eq!(places[1].types.len(), 2);
        assert_eq!(places[1].rating, None);
    }

    #[test]
    fn test_missing_local_results_is_empty() {
        let raw = json!({"search_metadata": {"status": "Success"}});
        assert!(parse_local_results(&raw, 5).unwrap().is_empty());

        let raw = json!({"error": "Google hasn't returned any results for this query."});
        assert!(parse_local_results(&raw, 5).unwrap().is_empty());
    }

    #[test]
    fn test_quota_error() {
        let raw = json!({"error": "Your account has run out of searches."});
        assert!(matches!(
            parse_local_results(&raw, 5),
            Err(SearchError::RateLimited(_))
        ));
    }

    #[test]
    fn test_client_creation() {
        let client = SerpApiClient::new("test_key".to_string()).with_max_results(3);
        assert_eq!(client.max_results, 3);
        assert!(SerpApiClient::from_config(&PlacesConfig::default()).is_none());
    }
}
