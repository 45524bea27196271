//! Agent System
//!
//! Each agent owns one slice of travel expertise. The router picks exactly one
//! agent per message:
//!
//! ```text
//! User Message
//!      │
//!      ▼
//! ┌─────────────┐
//! │   Intent    │  → keyword score, model fallback
//! │   Router    │
//! └─────────────┘
//!      │
//!      ├──► Accommodation ──► places (lodging)
//!      ├──► Food ───────────► places (restaurant) + cuisine knowledge
//!      ├──► Transport ──────► places (transit) + reference options
//!      ├──► Itinerary ──────► places (attraction) + slot planner
//!      ├──► Budget ─────────► pure computation, model tips only
//!      └──► General ────────► streamed completion
//!      │
//!      ▼
//!  AgentResponse
//! ```
//!
//! Agents degrade to canned replies when text generation is unavailable; they
//! only fail for requests they cannot interpret (see [`AgentError`]).

pub mod accommodation;
pub mod budget;
pub mod food;
pub mod general;
pub mod itinerary;
pub mod response;
pub mod shared;
pub mod transport;

pub use accommodation::AccommodationAgent;
pub use budget::{BudgetAgent, BudgetReport};
pub use food::FoodAgent;
pub use general::GeneralAgent;
pub use itinerary::ItineraryAgent;
pub use response::{AgentAction, AgentData, AgentResponse};
pub use transport::{TransportAgent, TransportData};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::llm::TextGenerator;
use crate::models::{Message, TripContext};
use crate::places::PlacesGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Accommodation,
    Food,
    Transport,
    Itinerary,
    Budget,
    General,
    /// Router-level failure; never selected by classification
    Error,
}

impl AgentType {
    /// Agents a message can be routed to
    pub const ROUTABLE: [AgentType; 6] = [
        AgentType::Accommodation,
        AgentType::Food,
        AgentType::Transport,
        AgentType::Itinerary,
        AgentType::Budget,
        AgentType::General,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AgentType::Accommodation => "accommodation",
            AgentType::Food => "food",
            AgentType::Transport => "transport",
            AgentType::Itinerary => "itinerary",
            AgentType::Budget => "budget",
            AgentType::General => "general",
            AgentType::Error => "error",
        }
    }

    /// Inverse of [`AgentType::label`] for routable agents only
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ROUTABLE
            .into_iter()
            .find(|agent| agent.label().eq_ignore_ascii_case(label.trim()))
    }

    pub fn default_suggestions(&self) -> &'static [&'static str] {
        match self {
            AgentType::Accommodation => &["Tìm khách sạn khác", "Khách sạn giá rẻ", "Resort cao cấp"],
            AgentType::Food => &["Tìm nhà hàng gần đây", "Gợi ý món đặc sản", "Quán ăn bình dân"],
            AgentType::Transport => &["Di chuyển liên tỉnh", "Phương tiện nội thành", "Thuê xe"],
            AgentType::Itinerary => &["Tạo lịch trình", "Tìm điểm tham quan", "Gợi ý hoạt động"],
            AgentType::Budget => &["Ước tính chi phí", "Phân bổ ngân sách", "Mẹo tiết kiệm"],
            AgentType::General => &[
                "Tìm khách sạn",
                "Gợi ý món ăn",
                "Lập lịch trình",
                "Tính ngân sách",
            ],
            AgentType::Error => &["Thử lại", "Hỏi câu khác"],
        }
    }

    /// Reply used when an agent produced no text
    pub fn canned_reply(&self) -> &'static str {
        match self {
            AgentType::Accommodation => {
                "Tôi có thể giúp bạn tìm chỗ ở phù hợp. Bạn muốn ở khu vực nào và ngân sách khoảng bao nhiêu mỗi đêm?"
            }
            AgentType::Food => {
                "Tôi có thể gợi ý món đặc sản và nhà hàng ngon. Bạn đang ở thành phố nào?"
            }
            AgentType::Transport => {
                "Tôi có thể giúp bạn chọn phương tiện di chuyển. Bạn đi từ đâu đến đâu?"
            }
            AgentType::Itinerary => {
                "Tôi có thể giúp bạn lập lịch trình. Chuyến đi của bạn kéo dài mấy ngày?"
            }
            AgentType::Budget => {
                "Tôi có thể giúp bạn ước tính và theo dõi chi phí chuyến đi. Ngân sách dự kiến của bạn là bao nhiêu?"
            }
            AgentType::General => {
                "Xin chào! Tôi là trợ lý du lịch. Tôi có thể giúp bạn tìm khách sạn, gợi ý món ăn, lập lịch trình và tính ngân sách."
            }
            AgentType::Error => {
                "Xin lỗi, tôi gặp sự cố khi xử lý yêu cầu của bạn. Bạn có thể thử lại?"
            }
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything an agent sees for one message
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub message: String,
    /// Already trimmed to the history window, oldest first
    pub history: Vec<Message>,
    pub trip: Option<TripContext>,
}

impl AgentRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            history: Vec::new(),
            trip: None,
        }
    }

    pub fn with_trip(mut self, trip: TripContext) -> Self {
        self.trip = Some(trip);
        self
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Invalid trip context: {0}")]
    InvalidTripContext(String),

    #[error("Agent failure: {0}")]
    Internal(String),
}

#[async_trait]
pub trait Agent: Send + Sync {
    fn agent_type(&self) -> AgentType;

    async fn respond(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError>;

    /// Emit the reply incrementally. Agents without incremental output send
    /// the whole reply as one chunk.
    async fn respond_streaming(
        &self,
        request: &AgentRequest,
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<AgentResponse, AgentError> {
        let response = self.respond(request).await?;
        if !response.message.is_empty() {
            on_chunk(&response.message);
        }
        Ok(response)
    }
}

/// Shared collaborators handed to every agent
#[derive(Clone)]
pub struct AgentDeps {
    pub generator: Arc<dyn TextGenerator>,
    pub places: Arc<PlacesGateway>,
    pub max_candidates: usize,
}

impl AgentDeps {
    pub fn new(generator: Arc<dyn TextGenerator>, places: Arc<PlacesGateway>) -> Self {
        let max_candidates = places.max_results().max(1);
        Self {
            generator,
            places,
            max_candidates,
        }
    }
}

/// Closed set of agents, one instance each
pub struct AgentRegistry {
    accommodation: AccommodationAgent,
    food: FoodAgent,
    transport: TransportAgent,
    itinerary: ItineraryAgent,
    budget: BudgetAgent,
    general: GeneralAgent,
}

impl AgentRegistry {
    pub fn new(deps: AgentDeps) -> Self {
        Self {
            accommodation: AccommodationAgent::new(deps.clone()),
            food: FoodAgent::new(deps.clone()),
            transport: TransportAgent::new(deps.clone()),
            itinerary: ItineraryAgent::new(deps.clone()),
            budget: BudgetAgent::new(deps.clone()),
            general: GeneralAgent::new(deps),
        }
    }

    /// `None` only for [`AgentType::Error`], which has no agent behind it
    pub fn get(&self, agent_type: AgentType) -> Option<&dyn Agent> {
        match agent_type {
            AgentType::Accommodation => Some(&self.accommodation),
            AgentType::Food => Some(&self.food),
            AgentType::Transport => Some(&self.transport),
            AgentType::Itinerary => Some(&self.itinerary),
            AgentType::Budget => Some(&self.budget),
            AgentType::General => Some(&self.general),
            AgentType::Error => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Text generators with scripted behavior for agent and router tests.

    use super::*;
    use crate::config::PlacesConfig;
    use crate::llm::{GenerationError, GenerationOptions};
    use crate::places::{Place, PlaceQuery, PlaceSearch, SearchError};
    use crate::types::LLMMessage;
    use std::sync::Mutex;

    /// Always unavailable, like a gateway with no configured provider
    pub struct OfflineGenerator;

    #[async_trait]
    impl TextGenerator for OfflineGenerator {
        async fn generate(
            &self,
            _prompt: &str,
            _context: &[LLMMessage],
            _options: &GenerationOptions,
        ) -> Result<String, GenerationError> {
            Err(GenerationError::Unavailable("offline".to_string()))
        }

        async fn classify(&self, _message: &str, _labels: &[&str]) -> Result<String, GenerationError> {
            Err(GenerationError::Unavailable("offline".to_string()))
        }
    }

    /// Returns a fixed reply and records every prompt it was given
    pub struct FixedGenerator {
        pub reply: String,
        pub label: Option<String>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl FixedGenerator {
        pub fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                label: None,
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn with_label(mut self, label: &str) -> Self {
            self.label = Some(label.to_string());
            self
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn generate(
            &self,
            prompt: &str,
            _context: &[LLMMessage],
            _options: &GenerationOptions,
        ) -> Result<String, GenerationError> {
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(prompt.to_string());
            }
            Ok(self.reply.clone())
        }

        async fn classify(&self, _message: &str, labels: &[&str]) -> Result<String, GenerationError> {
            match &self.label {
                Some(label) if labels.contains(&label.as_str()) => Ok(label.clone()),
                Some(label) => Err(GenerationError::Malformed(label.clone())),
                None => Err(GenerationError::Unavailable("no label scripted".to_string())),
            }
        }
    }

    pub fn deps(generator: Arc<dyn TextGenerator>) -> AgentDeps {
        AgentDeps::new(generator, Arc::new(PlacesGateway::disabled()))
    }

    /// Places provider answering every query with the same records
    pub struct StaticPlaces(pub Vec<Place>);

    #[async_trait]
    impl PlaceSearch for StaticPlaces {
        fn name(&self) -> &'static str {
            "static"
        }

        async fn search(&self, _query: &PlaceQuery) -> Result<Vec<Place>, SearchError> {
            Ok(self.0.clone())
        }
    }

    pub fn deps_with_places(generator: Arc<dyn TextGenerator>, places: Vec<Place>) -> AgentDeps {
        let provider: Box<dyn PlaceSearch> = Box::new(StaticPlaces(places));
        let gateway = PlacesGateway::with_providers(vec![provider], &PlacesConfig::default());
        AgentDeps::new(generator, Arc::new(gateway))
    }

    pub fn place(name: &str, rating: Option<f32>, price_level: Option<u8>) -> Place {
        Place {
            name: name.to_string(),
            address: format!("{} street", name),
            latitude: Some(16.06),
            longitude: Some(108.22),
            rating,
            review_count: Some(42),
            price_level,
            types: Vec::new(),
            place_id: Some(format!("pid-{}", name.len())),
            image_url: None,
            source: "static".to_string(),
            price_per_night: None,
            currency: None,
            booking_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_round_trip() {
        for agent in AgentType::ROUTABLE {
            assert_eq!(AgentType::from_label(agent.label()), Some(agent));
        }
        assert_eq!(AgentType::from_label(" Budget "), Some(AgentType::Budget));
        assert_eq!(AgentType::from_label("error"), None);
        assert_eq!(AgentType::from_label("weather"), None);
    }

    #[test]
    fn test_every_agent_has_defaults() {
        for agent in AgentType::ROUTABLE {
            assert!(!agent.default_suggestions().is_empty());
            assert!(!agent.canned_reply().is_empty());
        }
    }

    #[test]
    fn test_registry_covers_routable_agents() {
        let registry = AgentRegistry::new(testing::deps(Arc::new(testing::OfflineGenerator)));
        for agent in AgentType::ROUTABLE {
            let resolved = registry.get(agent).map(|a| a.agent_type());
            assert_eq!(resolved, Some(agent));
        }
        assert!(registry.get(AgentType::Error).is_none());
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(serde_json::to_string(&AgentType::Itinerary).unwrap(), "\"itinerary\"");
    }
}
