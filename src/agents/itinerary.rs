//! Itinerary Agent
//!
//! Proposes sightseeing from the attraction search and fits it around what the
//! trip already holds. Placement rules:
//!
//! - days run from 1 to the trip length, each from 08:00 to 21:00
//! - two activities on the same day keep a 30 minute travel buffer
//! - booked, completed and visited activities never move
//! - other activities stay put when they fit, otherwise they move to the
//!   earliest free slot starting from their own day

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use super::shared::{self, STYLE_GUIDE};
use super::{Agent, AgentAction, AgentData, AgentDeps, AgentError, AgentRequest, AgentResponse, AgentType};
use crate::llm::GenerationOptions;
use crate::models::{ItemStatus, TripActivity};
use crate::places::{Place, PlaceCategory, PlaceFilters};

pub const DAY_START: i32 = 8 * 60;
pub const DAY_END: i32 = 21 * 60;
pub const TRAVEL_BUFFER: i32 = 30;
pub const PROPOSAL_MINUTES: i32 = 90;
const DEFAULT_DAYS: i32 = 3;
const MAX_DAYS: i32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItineraryIntent {
    Create,
    Modify,
    Attractions,
    General,
}

const CREATE_WORDS: &[&str] = &["lập lịch", "tạo lịch", "lên lịch", "kế hoạch", "schedule", "itinerary", "plan"];
const MODIFY_WORDS: &[&str] = &["thay đổi", "sửa", "đổi", "dời", "thêm", "bớt", "modify", "change", "move"];
const ATTRACTION_WORDS: &[&str] = &[
    "điểm tham quan", "đi đâu", "xem gì", "chơi gì", "attraction", "attractions", "visit", "sightseeing",
];

pub fn detect_intent(message: &str) -> ItineraryIntent {
    let tokens = shared::tokenize(message);
    if shared::contains_any(&tokens, MODIFY_WORDS) {
        ItineraryIntent::Modify
    } else if shared::contains_any(&tokens, CREATE_WORDS) {
        ItineraryIntent::Create
    } else if shared::contains_any(&tokens, ATTRACTION_WORDS) {
        ItineraryIntent::Attractions
    } else {
        ItineraryIntent::General
    }
}

pub fn parse_hhmm(value: &str) -> Option<i32> {
    let (hours, minutes) = value.trim().split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.get(..2).unwrap_or(minutes).parse().ok()?;
    ((0..24).contains(&hours) && (0..60).contains(&minutes)).then_some(hours * 60 + minutes)
}

pub fn format_hhmm(minutes: i32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    start: i32,
    end: i32,
}

impl Window {
    fn conflicts(&self, other: &Window) -> bool {
        self.start < other.end + TRAVEL_BUFFER && other.start < self.end + TRAVEL_BUFFER
    }
}

fn window_of(activity: &TripActivity) -> Option<Window> {
    let start = parse_hhmm(&activity.start_time)?;
    let end = parse_hhmm(&activity.end_time)
        .filter(|end| *end > start)
        .unwrap_or(start + duration_of(activity));
    Some(Window { start, end })
}

fn duration_of(activity: &TripActivity) -> i32 {
    match (parse_hhmm(&activity.start_time), parse_hhmm(&activity.end_time)) {
        (Some(start), Some(end)) if end > start => end - start,
        _ if activity.duration_minutes > 0 => activity.duration_minutes,
        _ => PROPOSAL_MINUTES,
    }
}

/// Occupied windows per day
struct DayBook {
    occupied: Vec<Vec<Window>>,
}

impl DayBook {
    fn new(days: i32) -> Self {
        Self {
            occupied: vec![Vec::new(); days.max(1) as usize],
        }
    }

    fn days(&self) -> i32 {
        self.occupied.len() as i32
    }

    fn slot(&self, day: i32) -> Option<&Vec<Window>> {
        if day < 1 {
            return None;
        }
        self.occupied.get(day as usize - 1)
    }

    fn is_free(&self, day: i32, window: Window) -> bool {
        if window.start < DAY_START || window.end > DAY_END {
            return false;
        }
        self.slot(day)
            .is_some_and(|taken| !taken.iter().any(|w| w.conflicts(&window)))
    }

    fn reserve(&mut self, day: i32, window: Window) {
        if day >= 1 {
            if let Some(taken) = self.occupied.get_mut(day as usize - 1) {
                taken.push(window);
            }
        }
    }

    fn earliest(&self, day: i32, duration: i32) -> Option<Window> {
        let taken = self.slot(day)?;
        std::iter::once(DAY_START)
            .chain(taken.iter().map(|w| w.end + TRAVEL_BUFFER))
            .map(|start| Window {
                start,
                end: start + duration,
            })
            .filter(|w| self.is_free(day, *w))
            .min_by_key(|w| w.start)
    }

    /// Days in search order: `from` onward, then the earlier ones
    fn search_order(&self, from: i32) -> impl Iterator<Item = i32> {
        let from = from.clamp(1, self.days());
        (from..=self.days()).chain(1..from)
    }

    fn load(&self, day: i32) -> usize {
        self.slot(day).map_or(usize::MAX, Vec::len)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanOutcome {
    /// Every placed activity, ordered by day and start time
    pub schedule: Vec<TripActivity>,
    pub added: Vec<TripActivity>,
    pub moved: Vec<TripActivity>,
    /// Activities with no free slot left anywhere in the trip
    pub unplaced: Vec<TripActivity>,
}

fn placed(activity: &TripActivity, day: i32, window: Window) -> TripActivity {
    TripActivity {
        day_number: day,
        start_time: format_hhmm(window.start),
        end_time: format_hhmm(window.end),
        duration_minutes: window.end - window.start,
        ..activity.clone()
    }
}

pub fn plan_schedule(existing: &[TripActivity], days: i32, proposals: &[Place]) -> PlanOutcome {
    let mut book = DayBook::new(days);
    let mut outcome = PlanOutcome::default();

    let (locked, mut movable): (Vec<&TripActivity>, Vec<&TripActivity>) =
        existing.iter().partition(|a| a.status.is_locked());

    for activity in locked {
        if let Some(window) = window_of(activity) {
            book.reserve(activity.day_number, window);
        }
        outcome.schedule.push(activity.clone());
    }

    movable.sort_by_key(|a| (a.day_number, window_of(a).map(|w| w.start)));

    for activity in movable {
        if let Some(window) = window_of(activity).filter(|w| book.is_free(activity.day_number, *w)) {
            book.reserve(activity.day_number, window);
            outcome.schedule.push(activity.clone());
            continue;
        }

        let duration = duration_of(activity);
        let target = book
            .search_order(activity.day_number)
            .find_map(|day| book.earliest(day, duration).map(|w| (day, w)));

        match target {
            Some((day, window)) => {
                book.reserve(day, window);
                let moved = placed(activity, day, window);
                outcome.schedule.push(moved.clone());
                outcome.moved.push(moved);
            }
            None => outcome.unplaced.push(activity.clone()),
        }
    }

    for place in proposals {
        if existing.iter().any(|a| shared::tokenize(&a.name) == shared::tokenize(&place.name)) {
            continue;
        }

        // Least busy day first, then the earliest day
        let mut days: Vec<i32> = (1..=book.days()).collect();
        days.sort_by_key(|d| (book.load(*d), *d));

        let Some((day, window)) = days
            .into_iter()
            .find_map(|day| book.earliest(day, PROPOSAL_MINUTES).map(|w| (day, w)))
        else {
            debug!(name = %place.name, "No free slot left for proposal");
            continue;
        };

        book.reserve(day, window);
        let activity = TripActivity {
            id: None,
            name: place.name.clone(),
            location: place.address.clone(),
            day_number: day,
            start_time: format_hhmm(window.start),
            end_time: format_hhmm(window.end),
            duration_minutes: PROPOSAL_MINUTES,
            category: "sightseeing".to_string(),
            status: ItemStatus::Suggested,
        };
        outcome.schedule.push(activity.clone());
        outcome.added.push(activity);
    }

    outcome
        .schedule
        .sort_by_key(|a| (a.day_number, window_of(a).map(|w| w.start)));
    outcome
}

fn describe_schedule(schedule: &[TripActivity]) -> String {
    let mut lines = Vec::new();
    let mut current_day = None;
    for activity in schedule {
        if current_day != Some(activity.day_number) {
            current_day = Some(activity.day_number);
            lines.push(format!("Ngày {}:", activity.day_number));
        }
        lines.push(format!(
            "- {} - {}: {}",
            activity.start_time, activity.end_time, activity.name
        ));
    }
    lines.join("\n")
}

pub struct ItineraryAgent {
    deps: AgentDeps,
}

impl ItineraryAgent {
    pub fn new(deps: AgentDeps) -> Self {
        Self { deps }
    }

    fn trip_days(request: &AgentRequest) -> i32 {
        let from_trip = request
            .trip
            .as_ref()
            .and_then(|t| t.duration_days())
            .map(|d| d as i32);
        let from_message = shared::extract_entities(&request.message)
            .days
            .map(|d| d as i32);

        from_trip
            .or(from_message)
            .filter(|d| *d > 0)
            .unwrap_or(DEFAULT_DAYS)
            .min(MAX_DAYS)
    }

    async fn attractions(&self, location: Option<&str>) -> Vec<Place> {
        let Some(location) = location else {
            return Vec::new();
        };
        let filters = PlaceFilters {
            limit: Some(self.deps.max_candidates),
            ..Default::default()
        };
        self.deps
            .places
            .search_places(PlaceCategory::Attraction, location, &filters)
            .await
    }
}

#[async_trait]
impl Agent for ItineraryAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Itinerary
    }

    async fn respond(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError> {
        if let Some(trip) = request.trip.as_ref().filter(|t| t.has_inverted_dates()) {
            return Err(AgentError::InvalidTripContext(format!(
                "trip {} ends before it starts",
                trip.trip_id
            )));
        }

        let intent = detect_intent(&request.message);
        let days = Self::trip_days(request);
        let location = shared::location_hint(&request.message, request.trip.as_ref());
        let existing: &[TripActivity] = request
            .trip
            .as_ref()
            .map(|t| t.activities.as_slice())
            .unwrap_or_default();

        let proposals = match intent {
            ItineraryIntent::Modify => Vec::new(),
            _ => self.attractions(location.as_deref()).await,
        };

        let outcome = plan_schedule(existing, days, &proposals);

        info!(
            ?intent,
            days,
            added = outcome.added.len(),
            moved = outcome.moved.len(),
            unplaced = outcome.unplaced.len(),
            "Itinerary planned"
        );

        let mut canned = if outcome.schedule.is_empty() {
            format!(
                "Chưa có hoạt động nào cho chuyến đi {} ngày. Cho tôi biết bạn thích tham quan, ẩm thực hay nghỉ dưỡng để tôi gợi ý nhé.",
                days
            )
        } else {
            format!(
                "Lịch trình {} ngày{}:\n{}",
                days,
                location.as_deref().map(|l| format!(" tại {}", l)).unwrap_or_default(),
                describe_schedule(&outcome.schedule)
            )
        };
        if !outcome.unplaced.is_empty() {
            let names: Vec<&str> = outcome.unplaced.iter().map(|a| a.name.as_str()).collect();
            canned.push_str(&format!(
                "\n\nKhông còn khung giờ trống cho: {}.",
                names.join(", ")
            ));
        }

        let message = if outcome.added.is_empty() && outcome.moved.is_empty() {
            canned
        } else {
            let prompt = format!(
                "Người dùng hỏi: \"{}\"\n\nLịch trình đề xuất:\n{}\n\n\
                 Trình bày lịch trình này theo từng ngày, giữ đúng giờ giấc, \
                 thêm một câu gợi ý ngắn cho mỗi hoạt động mới.",
                request.message,
                describe_schedule(&outcome.schedule)
            );
            let options = GenerationOptions::with_system(format!(
                "Bạn là chuyên gia lập lịch trình du lịch Việt Nam. {}",
                STYLE_GUIDE
            ));
            let context = shared::history_messages(&request.history);
            match self.deps.generator.generate(&prompt, &context, &options).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Itinerary reply generation failed, using schedule listing");
                    canned
                }
            }
        };

        let mut actions: Vec<AgentAction> = outcome
            .added
            .iter()
            .map(|a| {
                AgentAction::new("add_activity", format!("Thêm {} (ngày {})", a.name, a.day_number))
                    .with_payload(json!(a))
            })
            .collect();
        actions.extend(outcome.moved.iter().map(|a| {
            AgentAction::new(
                "reschedule_activity",
                format!("Dời {} sang ngày {} lúc {}", a.name, a.day_number, a.start_time),
            )
            .with_payload(json!({
                "id": a.id,
                "day_number": a.day_number,
                "start_time": a.start_time,
                "end_time": a.end_time,
            }))
        }));

        Ok(AgentResponse::new(AgentType::Itinerary, message)
            .with_data(AgentData::Activities(outcome.schedule))
            .with_actions(actions)
            .with_suggestions(["Thêm hoạt động", "Tìm điểm tham quan", "Xem lịch trình theo ngày"]))
    }
}
