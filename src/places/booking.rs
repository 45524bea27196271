//! Booking.com hotel search over RapidAPI
//!
//! Two calls per search: resolve the location to a destination id, then list
//! hotels for the stay. Prices come back per stay and are spread per night.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{Place, SearchError};
use crate::config::PlacesConfig;

const BOOKING_API_HOST: &str = "booking-com.p.rapidapi.com";

/// Dated hotel query for one stay
#[derive(Debug, Clone)]
pub struct HotelQuery {
    pub location: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub adults: u32,
    pub rooms: u32,
    pub currency: String,
    pub language: String,
    pub limit: usize,
}

impl HotelQuery {
    /// At least one night, even for same-day or inverted dates
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days().max(1)
    }
}

#[async_trait]
pub trait HotelSearch: Send + Sync {
    fn name(&self) -> &'static str;

    /// Zero matches is `Ok(vec![])`, never an error
    async fn search_hotels(&self, query: &HotelQuery) -> Result<Vec<Place>, SearchError>;
}

pub struct BookingClient {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct RawLocation {
    #[serde(default)]
    dest_id: Option<String>,
    #[serde(default)]
    dest_type: Option<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<RawHotel>,
}

#[derive(Deserialize)]
struct RawHotel {
    #[serde(default)]
    hotel_id: Option<u64>,
    #[serde(default)]
    hotel_name: Option<String>,
    #[serde(default)]
    accommodation_type_name: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    min_total_price: Option<f64>,
    #[serde(default)]
    currencycode: Option<String>,
    /// 0 to 10
    #[serde(default)]
    review_score: Option<f32>,
    #[serde(default)]
    review_nr: Option<u32>,
    #[serde(default)]
    main_photo_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl BookingClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: format!("https://{}", BOOKING_API_HOST),
        }
    }

    pub fn from_config(config: &PlacesConfig) -> Option<Self> {
        if config.rapidapi_key.is_empty() {
            return None;
        }
        Some(Self::new(config.rapidapi_key.clone()))
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .header("X-RapidAPI-Key", &self.api_key)
            .header("X-RapidAPI-Host", BOOKING_API_HOST)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, SearchError> {
        let response = request
            .send()
            .await
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SearchError::RateLimited(self.name().to_string()));
        }
        if !response.status().is_success() {
            return Err(SearchError::RequestFailed(format!(
                "Booking API returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| SearchError::ParseError(e.to_string()))
    }

    async fn destination(&self, query: &HotelQuery) -> Result<Option<(String, String)>, SearchError> {
        let locations: Vec<RawLocation> = self
            .send(self.get("/v1/hotels/locations").query(&[
                ("name", query.location.as_str()),
                ("locale", query.language.as_str()),
            ]))
            .await?;

        Ok(locations.into_iter().find_map(|l| {
            let id = l.dest_id.filter(|id| !id.is_empty())?;
            Some((id, l.dest_type.unwrap_or_else(|| "city".to_string())))
        }))
    }

    fn normalize(raw: RawHotel, query: &HotelQuery) -> Option<Place> {
        let name = raw.hotel_name.filter(|n| !n.trim().is_empty())?;
        let address = match (raw.address, raw.city) {
            (Some(address), Some(city)) if !city.is_empty() => format!("{}, {}", address, city),
            (Some(address), _) => address,
            (None, city) => city.unwrap_or_default(),
        };

        Some(Place {
            name,
            address,
            latitude: raw.latitude,
            longitude: raw.longitude,
            rating: raw.review_score.map(|score| score / 2.0),
            review_count: raw.review_nr,
            price_level: None,
            types: raw.accommodation_type_name.into_iter().collect(),
            place_id: raw.hotel_id.map(|id| format!("booking:{}", id)),
            image_url: raw.main_photo_url,
            source: "booking".to_string(),
            price_per_night: raw
                .min_total_price
                .map(|total| (total / query.nights() as f64).round()),
            currency: raw.currencycode.or_else(|| Some(query.currency.clone())),
            booking_url: raw.url,
        })
    }
}

#[async_trait]
impl HotelSearch for BookingClient {
    fn name(&self) -> &'static str {
        "booking"
    }

    async fn search_hotels(&self, query: &HotelQuery) -> Result<Vec<Place>, SearchError> {
        if self.api_key.is_empty() {
            return Err(SearchError::NoApiKey);
        }

        let Some((dest_id, dest_type)) = self.destination(query).await? else {
            debug!(location = %query.location, "Booking has no destination for location");
            return Ok(Vec::new());
        };

        let check_in = query.check_in.format("%Y-%m-%d").to_string();
        let check_out = query.check_out.format("%Y-%m-%d").to_string();
        let adults = query.adults.max(1).to_string();
        let rooms = query.rooms.max(1).to_string();

        debug!(%dest_id, %check_in, %check_out, adults = %adults, "Searching Booking hotels");

        let body: SearchResponse = self
            .send(self.get("/v1/hotels/search").query(&[
                ("dest_id", dest_id.as_str()),
                ("dest_type", dest_type.as_str()),
                ("checkin_date", check_in.as_str()),
                ("checkout_date", check_out.as_str()),
                ("adults_number", adults.as_str()),
                ("room_number", rooms.as_str()),
                ("order_by", "popularity"),
                ("units", "metric"),
                ("filter_by_currency", query.currency.as_str()),
                ("locale", query.language.as_str()),
                ("page_number", "0"),
            ]))
            .await?;

        Ok(body
            .result
            .into_iter()
            .filter_map(|raw| Self::normalize(raw, query))
            .take(query.limit)
            .collect())
    }
}
