//! Structured agent output shared by the router, the HTTP layer and the stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::budget::BudgetReport;
use super::transport::TransportData;
use super::AgentType;
use crate::models::TripActivity;
use crate::places::Place;

/// Follow-up the client may offer as a button
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    #[serde(rename = "type")]
    pub action_type: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl AgentAction {
    pub fn new(action_type: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            label: label.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// At most one structured bundle accompanies a reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum AgentData {
    Accommodations(Vec<Place>),
    Restaurants(Vec<Place>),
    Transport(TransportData),
    Activities(Vec<TripActivity>),
    Budget(BudgetReport),
}

impl AgentData {
    /// Number of entries in list-shaped bundles
    pub fn len(&self) -> usize {
        match self {
            AgentData::Accommodations(items) | AgentData::Restaurants(items) => items.len(),
            AgentData::Transport(data) => data.options.len() + data.hubs.len(),
            AgentData::Activities(items) => items.len(),
            AgentData::Budget(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub message: String,
    pub agent_type: AgentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<AgentData>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub actions: Vec<AgentAction>,
}

impl AgentResponse {
    pub fn new(agent_type: AgentType, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            agent_type,
            data: None,
            suggestions: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn with_data(mut self, data: AgentData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_suggestions<I, S>(mut self, suggestions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggestions = suggestions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_actions(mut self, actions: Vec<AgentAction>) -> Self {
        self.actions = actions;
        self
    }

    /// Graceful reply used when routing itself fails
    pub fn error() -> Self {
        Self::new(AgentType::Error, AgentType::Error.canned_reply())
            .with_suggestions(AgentType::Error.default_suggestions().iter().copied())
    }
}
