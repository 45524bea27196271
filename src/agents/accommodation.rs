//! Accommodation Agent
//!
//! Finds lodging near the destination, honoring price preferences expressed in
//! the message and skipping venues the trip already has. Dated hotel search
//! with nightly prices is tried first; plain lodging search is the fallback.

use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use serde_json::json;
use tracing::{info, warn};

use super::shared::{self, STYLE_GUIDE};
use super::{Agent, AgentAction, AgentData, AgentDeps, AgentError, AgentRequest, AgentResponse, AgentType};
use crate::llm::GenerationOptions;
use crate::places::{HotelQuery, Place, PlaceCategory, PlaceFilters};

const LUXURY: &[&str] = &["cao cấp", "sang trọng", "luxury", "5 sao", "five star", "5 star", "resort"];
const FOUR_STAR: &[&str] = &["4 sao", "4 star", "four star"];
const CHEAP: &[&str] = &["giá rẻ", "bình dân", "rẻ", "cheap", "budget", "hostel", "nhà nghỉ"];
const LODGING_KINDS: &[&str] = &["resort", "homestay", "hostel", "villa", "boutique", "apartment"];
const DEFAULT_ADULTS: u32 = 2;

/// Translate price words into place filters
pub(crate) fn preference_filters(message: &str, limit: usize) -> PlaceFilters {
    let tokens = shared::tokenize(message);

    let mut filters = PlaceFilters {
        limit: Some(limit),
        ..Default::default()
    };

    if shared::contains_any(&tokens, LUXURY) {
        filters.min_rating = Some(4.5);
    } else if shared::contains_any(&tokens, FOUR_STAR) {
        filters.min_rating = Some(4.0);
    } else if shared::contains_any(&tokens, CHEAP) {
        filters.max_price_level = Some(2);
    }

    filters.keyword = LODGING_KINDS
        .iter()
        .find(|kind| shared::contains_phrase(&tokens, kind))
        .map(|kind| kind.to_string());

    filters
}

fn same_venue(a: &str, b: &str) -> bool {
    shared::tokenize(a) == shared::tokenize(b)
}

/// Stay dates and party size: the trip's dates when set, otherwise one night
/// from `today`; travelers named in the message win over the trip's count.
pub(crate) fn stay_query(request: &AgentRequest, location: &str, today: NaiveDate) -> HotelQuery {
    let trip = request.trip.as_ref();

    let check_in = trip.and_then(|t| t.start_date).unwrap_or(today);
    let check_out = trip
        .and_then(|t| t.end_date)
        .filter(|end| *end > check_in)
        .or_else(|| check_in.checked_add_days(Days::new(1)))
        .unwrap_or(check_in);

    let adults = shared::extract_entities(&request.message)
        .travelers
        .or_else(|| trip.and_then(|t| u32::try_from(t.travelers_count).ok()).filter(|n| *n > 0))
        .unwrap_or(DEFAULT_ADULTS);

    let currency = trip
        .map(|t| t.currency.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "VND".to_string());

    HotelQuery {
        location: location.to_string(),
        check_in,
        check_out,
        adults,
        rooms: 1,
        currency,
        language: String::new(),
        limit: 0,
    }
}

pub struct AccommodationAgent {
    deps: AgentDeps,
}

impl AccommodationAgent {
    pub fn new(deps: AgentDeps) -> Self {
        Self { deps }
    }

    fn save_actions(places: &[Place], stay: &HotelQuery) -> Vec<AgentAction> {
        places
            .iter()
            .map(|place| {
                AgentAction::new("save_accommodation", format!("Lưu {}", place.name)).with_payload(json!({
                    "name": place.name,
                    "address": place.address,
                    "rating": place.rating,
                    "price_level": place.price_level,
                    "price_per_night": place.price_per_night,
                    "currency": place.currency,
                    "booking_url": place.booking_url,
                    "check_in": stay.check_in,
                    "check_out": stay.check_out,
                    "place_id": place.place_id,
                    "latitude": place.latitude,
                    "longitude": place.longitude,
                }))
            })
            .collect()
    }

    fn nightly_price(place: &Place) -> Option<String> {
        place
            .price_per_night
            .map(|price| shared::format_money(price, place.currency.as_deref().unwrap_or_default()))
    }

    fn canned_summary(location: &str, places: &[Place]) -> String {
        let mut lines = vec![format!("Đây là một số lựa chọn chỗ ở tại {}:", location)];
        for (i, place) in places.iter().enumerate() {
            let rating = place
                .rating
                .map(|r| format!(" ({:.1}★)", r))
                .unwrap_or_default();
            let price = Self::nightly_price(place)
                .map(|p| format!(", {}/đêm", p))
                .unwrap_or_default();
            lines.push(format!("{}. {}{} - {}{}", i + 1, place.name, rating, place.address, price));
        }
        lines.push("Bạn muốn lưu khách sạn nào vào chuyến đi?".to_string());
        lines.join("\n")
    }

    fn build_prompt(request: &AgentRequest, location: &str, places: &[Place]) -> String {
        let listing = places
            .iter()
            .map(|p| {
                format!(
                    "- {} | {} | rating: {} | price level: {} | per night: {}",
                    p.name,
                    p.address,
                    p.rating.map(|r| format!("{:.1}", r)).unwrap_or_else(|| "n/a".to_string()),
                    p.price_level.map(|l| l.to_string()).unwrap_or_else(|| "n/a".to_string()),
                    Self::nightly_price(p).unwrap_or_else(|| "n/a".to_string()),
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let trip = request
            .trip
            .as_ref()
            .map(shared::trip_summary)
            .unwrap_or_default();

        format!(
            "Người dùng hỏi: \"{}\"\n\n\
             Thông tin chuyến đi:\n{}\n\n\
             Các chỗ ở tìm được tại {}:\n{}\n\n\
             Hãy giới thiệu ngắn gọn các lựa chọn trên, nêu điểm nổi bật của từng nơi \
             và gợi ý nơi phù hợp nhất với yêu cầu.",
            request.message, trip, location, listing
        )
    }
}

#[async_trait]
impl Agent for AccommodationAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Accommodation
    }

    async fn respond(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError> {
        let Some(location) = shared::location_hint(&request.message, request.trip.as_ref()) else {
            return Ok(AgentResponse::new(
                AgentType::Accommodation,
                "Bạn muốn tìm chỗ ở tại thành phố nào? Cho tôi biết thêm về ngân sách và loại hình bạn thích nhé.",
            )
            .with_suggestions([
                "Tôi muốn ở khách sạn 4 sao",
                "Ngân sách khoảng 1 triệu/đêm",
                "Cần gần trung tâm",
            ]));
        };

        let filters = preference_filters(&request.message, self.deps.max_candidates);
        let existing: Vec<&str> = request
            .trip
            .iter()
            .flat_map(|t| t.accommodations.iter().map(|a| a.name.as_str()))
            .collect();

        let mut stay = stay_query(request, &location, Utc::now().date_naive());
        stay.language = self.deps.places.language().to_string();
        stay.limit = self.deps.max_candidates;

        let mut found = self.deps.places.search_hotels(&stay, &filters).await;
        if found.is_empty() {
            found = self
                .deps
                .places
                .search_places(PlaceCategory::Lodging, &location, &filters)
                .await;
        }

        let places: Vec<Place> = found
            .into_iter()
            .filter(|p| !existing.iter().any(|name| same_venue(name, &p.name)))
            .take(self.deps.max_candidates)
            .collect();

        info!(
            location = %location,
            check_in = %stay.check_in,
            check_out = %stay.check_out,
            adults = stay.adults,
            candidates = places.len(),
            ?filters,
            "Accommodation search done"
        );

        if places.is_empty() {
            return Ok(AgentResponse::new(
                AgentType::Accommodation,
                format!(
                    "Tôi không tìm thấy khách sạn phù hợp tại {}. Bạn có thể thử điều chỉnh tiêu chí tìm kiếm.",
                    location
                ),
            )
            .with_data(AgentData::Accommodations(Vec::new()))
            .with_suggestions(["Tăng ngân sách", "Tìm ở khu vực khác", "Đổi ngày"]));
        }

        let prompt = Self::build_prompt(request, &location, &places);
        let options = GenerationOptions::with_system(STYLE_GUIDE);
        let context = shared::history_messages(&request.history);

        let message = match self.deps.generator.generate(&prompt, &context, &options).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Accommodation summary generation failed, using canned summary");
                Self::canned_summary(&location, &places)
            }
        };

        Ok(AgentResponse::new(AgentType::Accommodation, message)
            .with_actions(Self::save_actions(&places, &stay))
            .with_data(AgentData::Accommodations(places))
            .with_suggestions(["Xem chi tiết khách sạn này", "Tìm khách sạn khác", "Đặt phòng ngay"]))
    }
}
