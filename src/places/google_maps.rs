//! Google Places Text Search client

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{Place, PlaceQuery, PlaceSearch, SearchError};
use crate::config::PlacesConfig;

const GOOGLE_MAPS_API_BASE: &str = "https://maps.googleapis.com/maps/api";

pub struct GoogleMapsClient {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct TextSearchResponse {
    status: String,
    #[serde(default)]
    results: Vec<RawPlace>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct RawPlace {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    formatted_address: Option<String>,
    #[serde(default)]
    geometry: Option<Geometry>,
    #[serde(default)]
    rating: Option<f32>,
    #[serde(default)]
    user_ratings_total: Option<u32>,
    #[serde(default)]
    price_level: Option<u8>,
    #[serde(default)]
    types: Vec<String>,
    #[serde(default)]
    place_id: Option<String>,
    #[serde(default)]
    photos: Vec<Photo>,
}

#[derive(Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

#[derive(Deserialize)]
struct Photo {
    #[serde(default)]
    photo_reference: Option<String>,
}

impl GoogleMapsClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: GOOGLE_MAPS_API_BASE.to_string(),
        }
    }

    pub fn from_config(config: &PlacesConfig) -> Option<Self> {
        if config.google_maps_api_key.is_empty() {
            return None;
        }
        Some(Self::new(config.google_maps_api_key.clone()))
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn photo_url(&self, reference: &str) -> String {
        format!(
            "{}/place/photo?maxwidth=400&photo_reference={}&key={}",
            self.base_url, reference, self.api_key
        )
    }

    fn normalize(&self, raw: RawPlace) -> Option<Place> {
        // Records without a name are unusable
        let name = raw.name.filter(|n| !n.trim().is_empty())?;
        let image_url = raw
            .photos
            .iter()
            .find_map(|p| p.photo_reference.as_deref())
            .map(|r| self.photo_url(r));

        Some(Place {
            name,
            address: raw.formatted_address.unwrap_or_default(),
            latitude: raw.geometry.as_ref().map(|g| g.location.lat),
            longitude: raw.geometry.as_ref().map(|g| g.location.lng),
            rating: raw.rating,
            review_count: raw.user_ratings_total,
            price_level: raw.price_level,
            types: raw.types,
            place_id: raw.place_id,
            image_url,
            source: "google_places".to_string(),
            price_per_night: None,
            currency: None,
            booking_url: None,
        })
    }
}

#[async_trait]
impl PlaceSearch for GoogleMapsClient {
    fn name(&self) -> &'static str {
        "google_places"
    }

    async fn search(&self, query: &PlaceQuery) -> Result<Vec<Place>, SearchError> {
        if self.api_key.is_empty() {
            return Err(SearchError::NoApiKey);
        }

        let text = query.text();
        debug!(query = %text, "Searching Google Places");

        let response = self
            .client
            .get(format!("{}/place/textsearch/json", self.base_url))
            .query(&[
                ("query", text.as_str()),
                ("key", self.api_key.as_str()),
                ("language", query.language.as_str()),
                ("type", query.category.place_type()),
            ])
            .send()
            .await
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SearchError::RateLimited(self.name().to_string()));
        }
        if !response.status().is_success() {
            return Err(SearchError::RequestFailed(format!(
                "Places API returned {}",
                response.status()
            )));
        }

        let body: TextSearchResponse = response
            .json()
            .await
            .map_err(|e| SearchError::ParseError(e.to_string()))?;

        match body.status.as_str() {
            "OK" => {}
            "ZERO_RESULTS" => return Ok(Vec::new()),
            "OVER_QUERY_LIMIT" => return Err(SearchError::RateLimited(self.name().to_string())),
            other => {
                return Err(SearchError::RequestFailed(format!(
                    "Places API status {}: {}",
                    other,
                    body.error_message.unwrap_or_default()
                )))
            }
        }

        Ok(body
            .results
            .into_iter()
            .filter_map(|raw| self.normalize(raw))
            .take(query.limit)
            .collect())
    }
}
