//! Places Module
//!
//! Grounds agent answers in real venues. Two providers sit behind one gateway:
//! - Google Places Text Search (primary)
//! - SerpAPI Google Maps engine (secondary)
//!
//! Dated hotel availability with nightly prices comes from Booking.com when a
//! RapidAPI key is configured.
//!
//! Each provider is guarded by a client-side rate limiter and a per-call
//! timeout. Provider failures fall through to the next provider and finally
//! to an empty list, so callers never see a search error.

pub mod booking;
pub mod google_maps;
pub mod serpapi;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::PlacesConfig;

pub use booking::{BookingClient, HotelQuery, HotelSearch};
pub use google_maps::GoogleMapsClient;
pub use serpapi::SerpApiClient;

/// Errors that can occur during place search
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Places API key not configured")]
    NoApiKey,

    #[error("Search request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse search results: {0}")]
    ParseError(String),

    #[error("Rate limit reached for {0}")]
    RateLimited(String),

    #[error("Search timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceCategory {
    Lodging,
    Restaurant,
    Transit,
    Attraction,
}

impl PlaceCategory {
    /// Words appended to the free-text query
    pub fn query_term(&self) -> &'static str {
        match self {
            PlaceCategory::Lodging => "hotels",
            PlaceCategory::Restaurant => "restaurants",
            PlaceCategory::Transit => "bus station train station airport",
            PlaceCategory::Attraction => "tourist attractions",
        }
    }

    /// Google Places `type` parameter
    pub fn place_type(&self) -> &'static str {
        match self {
            PlaceCategory::Lodging => "lodging",
            PlaceCategory::Restaurant => "restaurant",
            PlaceCategory::Transit => "transit_station",
            PlaceCategory::Attraction => "tourist_attraction",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceFilters {
    pub keyword: Option<String>,
    pub min_rating: Option<f32>,
    pub max_price_level: Option<u8>,
    pub limit: Option<usize>,
}

impl PlaceFilters {
    pub fn keyword(keyword: impl Into<String>) -> Self {
        Self {
            keyword: Some(keyword.into()),
            ..Default::default()
        }
    }

    fn accepts(&self, place: &Place) -> bool {
        if let (Some(min), Some(rating)) = (self.min_rating, place.rating) {
            if rating < min {
                return false;
            }
        }
        if let (Some(max), Some(level)) = (self.max_price_level, place.price_level) {
            if level > max {
                return false;
            }
        }
        true
    }
}

/// Normalized place record shared by every provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub rating: Option<f32>,
    pub review_count: Option<u32>,
    /// 0 (free) to 4 (very expensive)
    pub price_level: Option<u8>,
    #[serde(default)]
    pub types: Vec<String>,
    pub place_id: Option<String>,
    pub image_url: Option<String>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_per_night: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_url: Option<String>,
}

/// One provider-level query
#[derive(Debug, Clone)]
pub struct PlaceQuery {
    pub category: PlaceCategory,
    pub location: String,
    pub keyword: Option<String>,
    pub language: String,
    pub limit: usize,
}

impl PlaceQuery {
    pub fn text(&self) -> String {
        match self.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            Some(keyword) => format!(
                "{} {} in {}",
                keyword,
                self.category.query_term(),
                self.location
            ),
            None => format!("{} in {}", self.category.query_term(), self.location),
        }
    }
}

#[async_trait]
pub trait PlaceSearch: Send + Sync {
    fn name(&self) -> &'static str;

    /// Zero matches is `Ok(vec![])`, never an error
    async fn search(&self, query: &PlaceQuery) -> Result<Vec<Place>, SearchError>;
}

struct GuardedProvider {
    inner: Box<dyn PlaceSearch>,
    limiter: DefaultDirectRateLimiter,
}

struct GuardedHotels {
    inner: Box<dyn HotelSearch>,
    limiter: DefaultDirectRateLimiter,
}

pub struct PlacesGateway {
    providers: Vec<GuardedProvider>,
    hotels: Option<GuardedHotels>,
    quota: Quota,
    timeout: Duration,
    max_results: usize,
    language: String,
}

impl PlacesGateway {
    pub fn from_config(config: &PlacesConfig) -> Self {
        let mut providers: Vec<Box<dyn PlaceSearch>> = Vec::new();
        if let Some(client) = GoogleMapsClient::from_config(config) {
            providers.push(Box::new(client));
        }
        if let Some(client) = SerpApiClient::from_config(config) {
            providers.push(Box::new(client));
        }

        if providers.is_empty() {
            warn!("No places provider configured; searches will return no candidates");
        }

        let gateway = Self::with_providers(providers, config);
        match BookingClient::from_config(config) {
            Some(client) => gateway.with_hotels(Box::new(client)),
            None => gateway,
        }
    }

    pub fn with_providers(providers: Vec<Box<dyn PlaceSearch>>, config: &PlacesConfig) -> Self {
        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(per_second);

        Self {
            providers: providers
                .into_iter()
                .map(|inner| GuardedProvider {
                    inner,
                    limiter: RateLimiter::direct(quota),
                })
                .collect(),
            hotels: None,
            quota,
            timeout: config.timeout(),
            max_results: config.max_results,
            language: config.language.clone(),
        }
    }

    /// Gateway without providers; every search yields an empty list
    pub fn disabled() -> Self {
        Self::with_providers(Vec::new(), &PlacesConfig::default())
    }

    /// Add a dated hotel search, consulted before the plain lodging search
    pub fn with_hotels(mut self, hotels: Box<dyn HotelSearch>) -> Self {
        self.hotels = Some(GuardedHotels {
            inner: hotels,
            limiter: RateLimiter::direct(self.quota),
        });
        self
    }

    pub fn providers(&self) -> Vec<&'static str> {
        self.providers
            .iter()
            .map(|p| p.inner.name())
            .chain(self.hotels.iter().map(|h| h.inner.name()))
            .collect()
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Longest a hotel search followed by a place search can take when every
    /// provider runs into its timeout
    pub fn call_budget(&self) -> Duration {
        let calls = self.providers.len() + usize::from(self.hotels.is_some());
        self.timeout * calls as u32
    }

    /// Dated hotel search. Without a hotel provider, or on any failure, the
    /// result is empty and callers fall back to [`Self::search_places`].
    pub async fn search_hotels(&self, query: &HotelQuery, filters: &PlaceFilters) -> Vec<Place> {
        let Some(hotels) = &self.hotels else {
            return Vec::new();
        };
        if query.location.trim().is_empty() {
            return Vec::new();
        }

        let name = hotels.inner.name();
        if hotels.limiter.check().is_err() {
            warn!(provider = name, "Hotel search rate limited");
            return Vec::new();
        }

        let limit = filters
            .limit
            .unwrap_or(self.max_results)
            .min(self.max_results);
        let query = HotelQuery {
            limit: limit * 2,
            ..query.clone()
        };

        let outcome = tokio::time::timeout(self.timeout, hotels.inner.search_hotels(&query))
            .await
            .map_err(|_| SearchError::Timeout(self.timeout))
            .and_then(|result| result);

        match outcome {
            Ok(found) => {
                let found: Vec<Place> = found
                    .into_iter()
                    .filter(|p| filters.accepts(p))
                    .take(limit)
                    .collect();
                info!(
                    provider = name,
                    location = %query.location,
                    nights = query.nights(),
                    count = found.len(),
                    "Hotel search completed"
                );
                found
            }
            Err(e) => {
                warn!(provider = name, error = %e, "Hotel search failed");
                Vec::new()
            }
        }
    }

    pub async fn search_places(
        &self,
        category: PlaceCategory,
        location_hint: &str,
        filters: &PlaceFilters,
    ) -> Vec<Place> {
        let location = location_hint.trim();
        if location.is_empty() {
            debug!(?category, "Skipping place search without a location");
            return Vec::new();
        }

        let limit = filters
            .limit
            .unwrap_or(self.max_results)
            .min(self.max_results);

        let query = PlaceQuery {
            category,
            location: location.to_string(),
            keyword: filters.keyword.clone(),
            language: self.language.clone(),
            // Over-fetch so post-filtering still fills the page
            limit: limit * 2,
        };

        for provider in &self.providers {
            let name = provider.inner.name();

            match self.search_with(provider, &query).await {
                Ok(places) => {
                    let places: Vec<Place> = places
                        .into_iter()
                        .filter(|p| filters.accepts(p))
                        .take(limit)
                        .collect();
                    info!(
                        provider = name,
                        ?category,
                        location = %location,
                        count = places.len(),
                        "Place search completed"
                    );
                    return places;
                }
                Err(e) => {
                    warn!(provider = name, error = %e, "Place search failed, trying next provider");
                }
            }
        }

        Vec::new()
    }

    async fn search_with(
        &self,
        provider: &GuardedProvider,
        query: &PlaceQuery,
    ) -> Result<Vec<Place>, SearchError> {
        if provider.limiter.check().is_err() {
            return Err(SearchError::RateLimited(provider.inner.name().to_string()));
        }

        tokio::time::timeout(self.timeout, provider.inner.search(query))
            .await
            .map_err(|_| SearchError::Timeout(self.timeout))?
    }
}
