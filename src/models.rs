use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::agents::{AgentAction, AgentData, AgentType};
use crate::config::Config;
use crate::context::{ContextAssembler, ConversationStore};
use crate::router::IntentRouter;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub router: Arc<IntentRouter>,
    pub assembler: Arc<ContextAssembler>,
    pub store: Arc<dyn ConversationStore>,
    pub info: Arc<ServiceInfo>,
}

/// Static facts reported by the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub llm_providers: Vec<String>,
    pub places_providers: Vec<String>,
    pub store: String,
}

// Persisted rows use runtime query_as, so FromRow is derived here.
// Timestamps are selected as timestamptz and ids cast to BIGINT by the store.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(format!("unknown message role: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: i64,
    pub user_id: i64,
    pub trip_id: Option<i64>,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub content: String,
    pub agent_type: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// A message about to be appended; the store assigns id and timestamp
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: i64,
    pub role: Role,
    pub content: String,
    pub agent_type: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl NewMessage {
    pub fn user(conversation_id: i64, content: impl Into<String>) -> Self {
        Self {
            conversation_id,
            role: Role::User,
            content: content.into(),
            agent_type: None,
            metadata: None,
        }
    }

    pub fn assistant(
        conversation_id: i64,
        content: impl Into<String>,
        agent_type: AgentType,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            conversation_id,
            role: Role::Assistant,
            content: content.into(),
            agent_type: Some(agent_type.to_string()),
            metadata,
        }
    }
}

/// Booking lifecycle of a trip item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    Suggested,
    Selected,
    Booked,
    Completed,
    Visited,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl ItemStatus {
    /// Locked items are fixed commitments the planner must not move
    pub fn is_locked(&self) -> bool {
        matches!(self, ItemStatus::Booked | ItemStatus::Completed | ItemStatus::Visited)
    }
}

impl From<String> for ItemStatus {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "suggested" => ItemStatus::Suggested,
            "selected" => ItemStatus::Selected,
            "booked" => ItemStatus::Booked,
            "completed" => ItemStatus::Completed,
            "visited" => ItemStatus::Visited,
            "cancelled" | "canceled" => ItemStatus::Cancelled,
            _ => ItemStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TripAccommodation {
    pub id: i64,
    pub name: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub address: String,
    pub price_per_night: f64,
    pub total_price: f64,
    #[sqlx(try_from = "String")]
    pub status: ItemStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TripRestaurant {
    pub id: i64,
    pub name: String,
    pub cuisine_type: String,
    pub address: String,
    pub price_range: String,
    #[sqlx(try_from = "String")]
    pub status: ItemStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TripTransportation {
    pub id: i64,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub from_location: String,
    pub to_location: String,
    pub price: f64,
    #[sqlx(try_from = "String")]
    pub status: ItemStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TripActivity {
    /// `None` for activities proposed by the planner and not yet saved
    pub id: Option<i64>,
    pub name: String,
    pub location: String,
    pub day_number: i32,
    /// HH:MM
    pub start_time: String,
    /// HH:MM
    pub end_time: String,
    pub duration_minutes: i32,
    pub category: String,
    #[sqlx(try_from = "String")]
    pub status: ItemStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TripExpense {
    pub id: i64,
    pub category: String,
    pub description: String,
    pub amount: f64,
    pub currency: String,
    pub date: NaiveDate,
    pub is_planned: bool,
}

/// Read-only snapshot of a trip handed to agents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripContext {
    pub trip_id: i64,
    pub destination: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub travelers_count: i32,
    pub budget: f64,
    pub currency: String,
    #[serde(default)]
    pub accommodations: Vec<TripAccommodation>,
    #[serde(default)]
    pub restaurants: Vec<TripRestaurant>,
    #[serde(default)]
    pub transportations: Vec<TripTransportation>,
    #[serde(default)]
    pub activities: Vec<TripActivity>,
    #[serde(default)]
    pub expenses: Vec<TripExpense>,
}

impl TripContext {
    pub fn new(trip_id: i64, destination: impl Into<String>) -> Self {
        Self {
            trip_id,
            destination: destination.into(),
            start_date: None,
            end_date: None,
            travelers_count: 1,
            budget: 0.0,
            currency: "VND".to_string(),
            accommodations: Vec::new(),
            restaurants: Vec::new(),
            transportations: Vec::new(),
            activities: Vec::new(),
            expenses: Vec::new(),
        }
    }

    /// Inclusive day count, `None` when dates are missing or inverted
    pub fn duration_days(&self) -> Option<i64> {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) if end >= start => Some((end - start).num_days() + 1),
            _ => None,
        }
    }

    pub fn has_inverted_dates(&self) -> bool {
        matches!((self.start_date, self.end_date), (Some(start), Some(end)) if end < start)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 4000, message = "message must be 1 to 4000 characters"))]
    pub message: String,
    pub trip_id: Option<i64>,
    pub conversation_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub message: Message,
    pub conversation_id: i64,
    pub agent_type: AgentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<AgentData>,
    pub suggestions: Vec<String>,
    pub actions: Vec<AgentAction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub llm_providers: Vec<String>,
    pub places_providers: Vec<String>,
    pub store: String,
}
