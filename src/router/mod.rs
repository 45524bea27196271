//! Intent Router
//!
//! Picks one agent per message and turns whatever the agent does into a valid
//! [`AgentResponse`]:
//!
//! ```text
//! message ──► keyword classifier ──► Match ───────────────┐
//!                    │                                    │
//!                    ├─ Ambiguous ─► model (tied + general)┤
//!                    └─ NoSignal ──► model (all labels) ───┤
//!                                       │ fails            │
//!                                       ▼                  ▼
//!                                    general ──────► agent (timeout, panic guard)
//!                                                          │
//!                                               error reply on failure
//! ```

pub mod classifier;

pub use classifier::{KeywordClassifier, KeywordOutcome, RoutingDecision, RoutingMethod};

use futures::future::{self, FutureExt};
use futures::stream::{self, BoxStream, StreamExt};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn, Instrument};

use crate::agents::{Agent, AgentDeps, AgentRegistry, AgentRequest, AgentResponse, AgentType};
use crate::config::RouterConfig;
use crate::llm::TextGenerator;
use crate::models::{Message, TripContext};
use crate::places::PlacesGateway;
use crate::streaming::ResponseEvent;

/// Slack on top of the gateways' own worst case
const TIMEOUT_MARGIN: Duration = Duration::from_secs(2);

/// Agent time limit that never fires before the gateways' own timeouts do.
/// An agent makes at most one generation and one hotel-then-place search.
fn agent_timeout(config: &RouterConfig, generator: &dyn TextGenerator, places: &PlacesGateway) -> Duration {
    let nested = generator.call_budget() + places.call_budget();
    if nested.is_zero() {
        config.agent_timeout()
    } else {
        config.agent_timeout().max(nested + TIMEOUT_MARGIN)
    }
}

pub struct IntentRouter {
    classifier: KeywordClassifier,
    generator: Arc<dyn TextGenerator>,
    registry: AgentRegistry,
    history_window: usize,
    max_suggestions: usize,
    agent_timeout: Duration,
}

impl IntentRouter {
    pub fn new(config: &RouterConfig, generator: Arc<dyn TextGenerator>, places: Arc<PlacesGateway>) -> Self {
        let agent_timeout = agent_timeout(config, generator.as_ref(), &places);
        if agent_timeout > config.agent_timeout() {
            info!(
                configured = ?config.agent_timeout(),
                effective = ?agent_timeout,
                "Agent timeout raised to cover gateway timeouts"
            );
        }
        let registry = AgentRegistry::new(AgentDeps::new(generator.clone(), places));
        Self {
            classifier: KeywordClassifier::new(config.min_keyword_signal as u32),
            generator,
            registry,
            history_window: config.history_window,
            max_suggestions: config.max_suggestions,
            agent_timeout,
        }
    }

    pub fn classifier(&self) -> &KeywordClassifier {
        &self.classifier
    }

    pub fn agent_timeout(&self) -> Duration {
        self.agent_timeout
    }

    /// Choose the agent for `message`. Never fails: every dead end is general.
    pub async fn decide(&self, message: &str) -> RoutingDecision {
        let message = message.trim();
        if message.is_empty() {
            return RoutingDecision::fallback("empty message");
        }

        let candidates: Vec<AgentType> = match self.classifier.classify(message) {
            KeywordOutcome::Match(agent, score) => return RoutingDecision::keyword(agent, score),
            KeywordOutcome::Ambiguous(mut tied) => {
                if !tied.contains(&AgentType::General) {
                    tied.push(AgentType::General);
                }
                tied
            }
            KeywordOutcome::NoSignal => AgentType::ROUTABLE.to_vec(),
        };

        let labels: Vec<&str> = candidates.iter().map(|a| a.label()).collect();
        match self.generator.classify(message, &labels).await {
            Ok(label) => match AgentType::from_label(&label).filter(|a| candidates.contains(a)) {
                Some(agent) => RoutingDecision::model(agent, format!("model chose {} of {}", label, labels.join("/"))),
                None => {
                    warn!(label = %label, "Model returned a label outside the candidates");
                    RoutingDecision::fallback(format!("unknown label {}", label))
                }
            },
            Err(e) => {
                debug!(error = %e, "Model classification unavailable");
                RoutingDecision::fallback(format!("classification ambiguous: {}", e))
            }
        }
    }

    fn request(&self, message: &str, history: &[Message], trip: Option<&TripContext>) -> AgentRequest {
        let start = history.len().saturating_sub(self.history_window);
        AgentRequest {
            message: message.trim().to_string(),
            history: history[start..].to_vec(),
            trip: trip.cloned(),
        }
    }

    pub async fn route(&self, message: &str, history: &[Message], trip: Option<&TripContext>) -> AgentResponse {
        let mut ignore = |_: &str| {};
        self.route_streaming(message, history, trip, &mut ignore).await
    }

    /// Route and forward reply text through `on_chunk` as it is produced
    pub async fn route_streaming(
        &self,
        message: &str,
        history: &[Message],
        trip: Option<&TripContext>,
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> AgentResponse {
        let decision = self.decide(message).await;
        info!(
            agent = %decision.agent,
            method = ?decision.method,
            confidence = decision.confidence,
            rationale = %decision.rationale,
            "Message routed"
        );

        let request = self.request(message, history, trip);

        let Some(agent) = self.registry.get(decision.agent) else {
            return self.finalize(AgentResponse::error());
        };

        // Text already forwarded to the caller survives a failure
        let mut streamed = String::new();
        let mut forward = |chunk: &str| {
            streamed.push_str(chunk);
            on_chunk(chunk);
        };

        let call = AssertUnwindSafe(agent.respond_streaming(&request, &mut forward)).catch_unwind();
        let outcome = tokio::time::timeout(self.agent_timeout, call).await;

        let failure = match outcome {
            Ok(Ok(Ok(response))) => return self.finalize(response),
            Ok(Ok(Err(e))) => {
                warn!(agent = %decision.agent, error = %e, "Agent failed");
                "failed"
            }
            Ok(Err(_)) => {
                error!(agent = %decision.agent, "Agent panicked");
                "panicked"
            }
            Err(_) => {
                warn!(agent = %decision.agent, timeout = ?self.agent_timeout, "Agent timed out");
                "timed out"
            }
        };

        let response = if streamed.trim().is_empty() {
            AgentResponse::error()
        } else {
            info!(
                agent = %decision.agent,
                failure,
                streamed_len = streamed.len(),
                "Keeping partial reply already streamed"
            );
            AgentResponse::new(decision.agent, streamed)
        };

        self.finalize(response)
    }

    fn finalize(&self, mut response: AgentResponse) -> AgentResponse {
        if response.message.trim().is_empty() {
            response.message = response.agent_type.canned_reply().to_string();
        }
        if response.suggestions.is_empty() {
            response.suggestions = response
                .agent_type
                .default_suggestions()
                .iter()
                .map(|s| s.to_string())
                .collect();
        }
        response.suggestions.truncate(self.max_suggestions);
        response
    }

    /// Delta events while the agent works, then exactly one final event.
    /// The routing runs inside the span current at the call, and dropping the
    /// stream cancels it.
    pub fn route_stream(
        self: Arc<Self>,
        message: String,
        history: Vec<Message>,
        trip: Option<TripContext>,
    ) -> BoxStream<'static, ResponseEvent> {
        let (tx, rx) = futures::channel::mpsc::unbounded::<ResponseEvent>();

        let work = async move {
            let deltas = tx.clone();
            let mut on_chunk = move |chunk: &str| {
                let _ = deltas.unbounded_send(ResponseEvent::delta(chunk));
            };
            let response = self
                .route_streaming(&message, &history, trip.as_ref(), &mut on_chunk)
                .await;
            let _ = tx.unbounded_send(ResponseEvent::Final(response));
        };

        let driver = work
            .in_current_span()
            .into_stream()
            .filter_map(|_| future::ready(None::<ResponseEvent>));

        stream::select(rx, driver).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::{place, FixedGenerator, OfflineGenerator, StaticPlaces};
    use crate::agents::AgentData;
    use crate::config::PlacesConfig;
    use crate::llm::{GenerationError, GenerationOptions, LLMAdapter, LlmGateway, Provider, TextStream};
    use crate::models::Role;
    use crate::places::{Place, PlaceQuery, PlaceSearch, SearchError};
    use crate::streaming::collect_events;
    use crate::types::{AppError, AppResult, LLMMessage, LLMRequest, LLMResponse};
    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};

    fn router(generator: Arc<dyn TextGenerator>) -> IntentRouter {
        IntentRouter::new(&RouterConfig::default(), generator, Arc::new(PlacesGateway::disabled()))
    }

    fn history(count: usize) -> Vec<Message> {
        (0..count)
            .map(|i| Message {
                id: i as i64,
                conversation_id: 1,
                role: if i % 2 == 0 { Role::User } else { Role::Assistant },
                content: format!("message {}", i),
                agent_type: None,
                metadata: None,
                created_at: Utc::now(),
            })
            .collect()
    }

    /// Sleeps longer than any test timeout
    struct SlowGenerator;

    #[async_trait]
    impl TextGenerator for SlowGenerator {
        async fn generate(
            &self,
            _prompt: &str,
            _context: &[LLMMessage],
            _options: &GenerationOptions,
        ) -> Result<String, GenerationError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("late".to_string())
        }

        async fn classify(&self, _message: &str, _labels: &[&str]) -> Result<String, GenerationError> {
            Err(GenerationError::Unavailable("slow".to_string()))
        }
    }

    /// Provider that never answers within any timeout
    struct HangingAdapter;

    #[async_trait]
    impl LLMAdapter for HangingAdapter {
        async fn create_chat_completion(&self, _request: &LLMRequest) -> AppResult<LLMResponse> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(AppError::LLMApi("late".to_string()))
        }
    }

    /// Slow but within its timeout
    struct SlowPlaces(Vec<Place>);

    #[async_trait]
    impl PlaceSearch for SlowPlaces {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn search(&self, _query: &PlaceQuery) -> Result<Vec<Place>, SearchError> {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(self.0.clone())
        }
    }

    /// Streams one chunk and then stalls
    struct StallingGenerator;

    #[async_trait]
    impl TextGenerator for StallingGenerator {
        async fn generate(
            &self,
            _prompt: &str,
            _context: &[LLMMessage],
            _options: &GenerationOptions,
        ) -> Result<String, GenerationError> {
            Err(GenerationError::Unavailable("stream only".to_string()))
        }

        async fn classify(&self, _message: &str, _labels: &[&str]) -> Result<String, GenerationError> {
            Err(GenerationError::Unavailable("stalled".to_string()))
        }

        async fn generate_stream(
            &self,
            _prompt: &str,
            _context: &[LLMMessage],
            _options: &GenerationOptions,
        ) -> Result<TextStream, GenerationError> {
            Ok(futures::stream::iter(vec![Ok("Xin ".to_string())])
                .chain(futures::stream::pending())
                .boxed())
        }
    }

    /// Records the span each generation runs in
    #[derive(Default)]
    struct SpanRecordingGenerator {
        spans: std::sync::Mutex<Vec<Option<&'static str>>>,
    }

    #[async_trait]
    impl TextGenerator for SpanRecordingGenerator {
        async fn generate(
            &self,
            _prompt: &str,
            _context: &[LLMMessage],
            _options: &GenerationOptions,
        ) -> Result<String, GenerationError> {
            let name = tracing::Span::current().metadata().map(|m| m.name());
            self.spans.lock().unwrap().push(name);
            Ok("Chào bạn!".to_string())
        }

        async fn classify(&self, _message: &str, _labels: &[&str]) -> Result<String, GenerationError> {
            Err(GenerationError::Unavailable("no model".to_string()))
        }
    }

    struct PanickingGenerator;

    #[async_trait]
    impl TextGenerator for PanickingGenerator {
        async fn generate(
            &self,
            _prompt: &str,
            _context: &[LLMMessage],
            _options: &GenerationOptions,
        ) -> Result<String, GenerationError> {
            panic!("generator bug");
        }

        async fn classify(&self, _message: &str, _labels: &[&str]) -> Result<String, GenerationError> {
            Err(GenerationError::Unavailable("no model".to_string()))
        }
    }

    #[tokio::test]
    async fn test_keyword_match_skips_model() {
        let generator = Arc::new(FixedGenerator::new("ok").with_label("budget"));
        let decision = router(generator).decide("Tìm khách sạn ở Huế").await;
        assert_eq!(decision.agent, AgentType::Accommodation);
        assert_eq!(decision.method, RoutingMethod::Keyword);
    }

    #[tokio::test]
    async fn test_tie_goes_to_model_with_tied_labels() {
        let generator = Arc::new(FixedGenerator::new("ok").with_label("transport"));
        let decision = router(generator).decide("hotel or train").await;
        assert_eq!(decision.agent, AgentType::Transport);
        assert_eq!(decision.method, RoutingMethod::Model);

        // Budget is not among the tied candidates
        let generator = Arc::new(FixedGenerator::new("ok").with_label("budget"));
        let decision = router(generator).decide("hotel or train").await;
        assert_eq!(decision.agent, AgentType::General);
        assert_eq!(decision.method, RoutingMethod::Fallback);
    }

    #[tokio::test]
    async fn test_no_signal_and_model_down_goes_general() {
        let decision = router(Arc::new(OfflineGenerator)).decide("kể chuyện cười đi").await;
        assert_eq!(decision.agent, AgentType::General);
        assert_eq!(decision.method, RoutingMethod::Fallback);
    }

    #[tokio::test]
    async fn test_route_always_answers() {
        let router = router(Arc::new(OfflineGenerator));
        for message in [
            "Tìm khách sạn ở Đà Nẵng",
            "Quán ăn ngon ở Hà Nội",
            "Đi tàu từ Huế ra Hà Nội",
            "Lập lịch trình 3 ngày",
            "Ngân sách 5 triệu",
            "hello",
            "???",
        ] {
            let response = router.route(message, &[], None).await;
            assert!(!response.message.trim().is_empty(), "{}", message);
            assert!(response.suggestions.len() <= 5);
            assert_ne!(response.agent_type, AgentType::Error, "{}", message);
        }
    }

    #[tokio::test]
    async fn test_agent_error_becomes_error_reply() {
        let router = router(Arc::new(OfflineGenerator));
        let mut trip = TripContext::new(4, "Huế");
        trip.start_date = NaiveDate::from_ymd_opt(2025, 4, 10);
        trip.end_date = NaiveDate::from_ymd_opt(2025, 4, 1);

        let response = router.route("Lập lịch trình cho tôi", &[], Some(&trip)).await;
        assert_eq!(response.agent_type, AgentType::Error);
        assert_eq!(response.suggestions, vec!["Thử lại", "Hỏi câu khác"]);
    }

    #[tokio::test]
    async fn test_agent_timeout_becomes_error_reply() {
        let config = RouterConfig {
            agent_timeout_secs: 1,
            ..RouterConfig::default()
        };
        let router = IntentRouter::new(&config, Arc::new(SlowGenerator), Arc::new(PlacesGateway::disabled()));
        let response = router.route("hello", &[], None).await;
        assert_eq!(response.agent_type, AgentType::Error);
    }

    #[test]
    fn test_history_window_keeps_latest_in_order() {
        let router = router(Arc::new(OfflineGenerator));
        let request = router.request("  hi  ", &history(25), None);
        assert_eq!(request.message, "hi");
        assert_eq!(request.history.len(), 20);
        assert_eq!(request.history[0].content, "message 5");
        assert_eq!(request.history[19].content, "message 24");

        let request = router.request("hi", &history(3), None);
        assert_eq!(request.history.len(), 3);
    }

    #[tokio::test]
    async fn test_suggestions_are_capped() {
        let config = RouterConfig {
            max_suggestions: 2,
            ..RouterConfig::default()
        };
        let router = IntentRouter::new(&config, Arc::new(OfflineGenerator), Arc::new(PlacesGateway::disabled()));
        let response = router.route("xin chào", &[], None).await;
        assert_eq!(response.suggestions.len(), 2);
    }

    #[tokio::test]
    async fn test_route_stream_ends_with_single_final() {
        let router = Arc::new(router(Arc::new(FixedGenerator::new("Chào bạn!"))));
        let events: Vec<ResponseEvent> = router
            .route_stream("xin chào".to_string(), Vec::new(), None)
            .collect()
            .await;

        assert_eq!(events.iter().filter(|e| e.is_final()).count(), 1);
        assert!(events.last().is_some_and(|e| e.is_final()));

        let (response, streamed) = collect_events(futures::stream::iter(events)).await.unwrap();
        assert_eq!(streamed, "Chào bạn!");
        assert_eq!(response.message, "Chào bạn!");
        assert_eq!(response.agent_type, AgentType::General);
    }

    #[tokio::test]
    async fn test_gateway_outage_reaches_agent_fallback() {
        let generator = LlmGateway::with_adapters(
            vec![
                (Provider::Gemini, "primary".to_string(), Box::new(HangingAdapter) as Box<dyn LLMAdapter>),
                (Provider::OpenAI, "secondary".to_string(), Box::new(HangingAdapter) as Box<dyn LLMAdapter>),
            ],
            Duration::from_secs(1),
        );
        let places_config = PlacesConfig {
            timeout_secs: 1,
            ..PlacesConfig::default()
        };
        let places = PlacesGateway::with_providers(
            vec![Box::new(SlowPlaces(vec![place("Hue Riverside", Some(4.5), Some(2))])) as Box<dyn PlaceSearch>],
            &places_config,
        );
        let config = RouterConfig {
            agent_timeout_secs: 2,
            ..RouterConfig::default()
        };

        let router = IntentRouter::new(&config, Arc::new(generator), Arc::new(places));
        assert!(router.agent_timeout() > Duration::from_secs(3));

        let response = router.route("Tìm khách sạn ở Huế", &[], None).await;
        assert_eq!(response.agent_type, AgentType::Accommodation);
        assert!(response.message.contains("Hue Riverside"), "{}", response.message);
    }

    #[test]
    fn test_configured_timeout_kept_without_gateway_bounds() {
        let config = RouterConfig {
            agent_timeout_secs: 1,
            ..RouterConfig::default()
        };
        let router = IntentRouter::new(&config, Arc::new(OfflineGenerator), Arc::new(PlacesGateway::disabled()));
        assert_eq!(router.agent_timeout(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_timeout_after_deltas_keeps_streamed_text() {
        let config = RouterConfig {
            agent_timeout_secs: 1,
            ..RouterConfig::default()
        };
        let router = Arc::new(IntentRouter::new(
            &config,
            Arc::new(StallingGenerator),
            Arc::new(PlacesGateway::disabled()),
        ));

        let events: Vec<ResponseEvent> = router
            .route_stream("xin chào".to_string(), Vec::new(), None)
            .collect()
            .await;

        assert_eq!(events.first(), Some(&ResponseEvent::delta("Xin ")));
        let (response, streamed) = collect_events(futures::stream::iter(events)).await.unwrap();
        assert_eq!(streamed, "Xin ");
        assert_eq!(response.message, "Xin ");
        assert_eq!(response.agent_type, AgentType::General);
        assert!(!response.suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_agent_panic_becomes_error_reply() {
        let router = router(Arc::new(PanickingGenerator));
        let response = router.route("hello", &[], None).await;
        assert_eq!(response.agent_type, AgentType::Error);
        assert_eq!(response.message, AgentType::Error.canned_reply());
        assert_eq!(response.suggestions, vec!["Thử lại", "Hỏi câu khác"]);
    }

    #[tokio::test]
    async fn test_empty_agent_reply_gets_canned_text() {
        let places = PlacesGateway::with_providers(
            vec![Box::new(StaticPlaces(vec![place("Sun Hotel", Some(4.4), Some(2))])) as Box<dyn PlaceSearch>],
            &PlacesConfig::default(),
        );
        let router = IntentRouter::new(
            &RouterConfig::default(),
            Arc::new(FixedGenerator::new("")),
            Arc::new(places),
        );

        let response = router.route("Tìm khách sạn ở Huế", &[], None).await;
        assert_eq!(response.agent_type, AgentType::Accommodation);
        assert_eq!(response.message, AgentType::Accommodation.canned_reply());
        assert!(matches!(response.data, Some(AgentData::Accommodations(ref found)) if found.len() == 1));
    }

    #[tokio::test]
    async fn test_route_stream_runs_in_caller_span() {
        let _subscriber = tracing::subscriber::set_default(tracing_subscriber::registry());
        let generator = Arc::new(SpanRecordingGenerator::default());
        let router = Arc::new(router(generator.clone()));

        let span = tracing::info_span!("chat_stream");
        let events = span.in_scope(|| router.route_stream("xin chào".to_string(), Vec::new(), None));
        // Polled outside the span
        let events: Vec<ResponseEvent> = events.collect().await;

        assert!(events.last().is_some_and(|e| e.is_final()));
        assert_eq!(*generator.spans.lock().unwrap(), vec![Some("chat_stream")]);
    }
}
