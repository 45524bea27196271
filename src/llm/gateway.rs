//! Text-generation gateway.
//!
//! Agents and the router never talk to a vendor adapter directly. They go
//! through [`TextGenerator`], which hides the provider chain:
//!
//! ```text
//!   generate() ──► primary slot ──(timeout / error / empty)──► secondary slot
//!                                                                   │
//!                                           GenerationError::Unavailable ◄┘
//! ```

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::LLMConfig;
use crate::llm::provider::{build_adapter, LLMAdapter, LLMProviderConfig, Provider};
use crate::types::{LLMMessage, LLMRequest};

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Text generation unavailable: {0}")]
    Unavailable(String),

    #[error("Unusable model answer: {0}")]
    Malformed(String),
}

pub type TextStream = BoxStream<'static, Result<String, GenerationError>>;

#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    pub system_instruction: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl GenerationOptions {
    pub fn with_system(instruction: impl Into<String>) -> Self {
        Self {
            system_instruction: Some(instruction.into()),
            ..Default::default()
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt` following the conversation in `context`.
    async fn generate(
        &self,
        prompt: &str,
        context: &[LLMMessage],
        options: &GenerationOptions,
    ) -> Result<String, GenerationError>;

    /// Pick one of `labels` for `message`.
    async fn classify(&self, message: &str, labels: &[&str]) -> Result<String, GenerationError>;

    /// Stream a completion. Generators without incremental output yield the
    /// whole completion as a single chunk.
    async fn generate_stream(
        &self,
        prompt: &str,
        context: &[LLMMessage],
        options: &GenerationOptions,
    ) -> Result<TextStream, GenerationError> {
        let text = self.generate(prompt, context, options).await?;
        Ok(stream::once(async move { Ok(text) }).boxed())
    }

    /// Longest one `generate` call may take before giving up. Zero when the
    /// generator imposes no bound of its own.
    fn call_budget(&self) -> Duration {
        Duration::ZERO
    }
}

/// Accept an answer that is exactly one allowed label, or mentions exactly one.
pub fn parse_label(answer: &str, labels: &[&str]) -> Option<String> {
    let normalized = answer
        .trim()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();

    if let Some(label) = labels.iter().find(|l| l.eq_ignore_ascii_case(&normalized)) {
        return Some(label.to_string());
    }

    let tokens: Vec<&str> = normalized
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .collect();

    let mentioned: Vec<&&str> = labels
        .iter()
        .filter(|label| tokens.iter().any(|t| t.eq_ignore_ascii_case(label)))
        .collect();

    match mentioned.as_slice() {
        [only] => Some(only.to_string()),
        _ => None,
    }
}

fn classification_prompt(message: &str, labels: &[&str]) -> String {
    format!(
        "Classify the travel assistant request below into exactly one category.\n\
         Categories: {}\n\
         Reply with the category name only.\n\n\
         Request: {}",
        labels.join(", "),
        message
    )
}

struct ProviderSlot {
    provider: Provider,
    model: String,
    adapter: Box<dyn LLMAdapter>,
}

/// Provider chain backed by vendor adapters. At most a primary and a secondary
/// slot; each call is bounded by `timeout`.
pub struct LlmGateway {
    slots: Vec<ProviderSlot>,
    timeout: Duration,
    max_tokens: u32,
    temperature: f32,
}

impl LlmGateway {
    pub fn from_config(config: &LLMConfig) -> Self {
        let mut slots = Vec::new();

        let mut candidates = vec![(config.primary_provider.clone(), config.primary_model.clone())];
        if let (Some(provider), Some(model)) =
            (config.secondary_provider.clone(), config.secondary_model.clone())
        {
            candidates.push((provider, model));
        }

        for (provider_id, model) in candidates {
            let Some(slot_config) = LLMProviderConfig::resolve(config, &provider_id, &model) else {
                warn!(provider = %provider_id, "LLM provider not configured, skipping");
                continue;
            };
            match build_adapter(&slot_config) {
                Ok(adapter) => slots.push(ProviderSlot {
                    provider: slot_config.provider,
                    model: slot_config.model,
                    adapter,
                }),
                Err(e) => warn!(provider = %provider_id, error = %e, "Failed to build LLM adapter"),
            }
        }

        if slots.is_empty() {
            warn!("No LLM provider available; agents will answer with canned replies");
        } else {
            info!(
                providers = ?slots.iter().map(|s| s.provider.id()).collect::<Vec<_>>(),
                "LLM gateway ready"
            );
        }

        Self {
            slots,
            timeout: config.timeout(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    /// Build a gateway from explicit adapters, primary first.
    pub fn with_adapters(
        adapters: Vec<(Provider, String, Box<dyn LLMAdapter>)>,
        timeout: Duration,
    ) -> Self {
        let defaults = LLMConfig::default();
        Self {
            slots: adapters
                .into_iter()
                .take(2)
                .map(|(provider, model, adapter)| ProviderSlot {
                    provider,
                    model,
                    adapter,
                })
                .collect(),
            timeout,
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
        }
    }

    pub fn providers(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.provider.to_string()).collect()
    }

    fn request_for(
        &self,
        slot: &ProviderSlot,
        prompt: &str,
        context: &[LLMMessage],
        options: &GenerationOptions,
    ) -> LLMRequest {
        let mut messages = context.to_vec();
        messages.push(LLMMessage::user(prompt));
        LLMRequest {
            provider: slot.provider.to_string(),
            model: slot.model.clone(),
            messages,
            max_tokens: Some(options.max_tokens.unwrap_or(self.max_tokens)),
            temperature: Some(options.temperature.unwrap_or(self.temperature)),
            system_instruction: options.system_instruction.clone(),
        }
    }

    async fn open_stream(&self, slot: &ProviderSlot, request: &LLMRequest) -> Result<TextStream, String> {
        if !slot.adapter.supports_streaming() {
            let response = tokio::time::timeout(self.timeout, slot.adapter.create_chat_completion(request))
                .await
                .map_err(|_| format!("timed out after {:?}", self.timeout))?
                .map_err(|e| e.to_string())?;
            if response.content.trim().is_empty() {
                return Err("empty completion".to_string());
            }
            let content = response.content;
            return Ok(stream::once(async move { Ok(content) }).boxed());
        }

        let mut upstream = tokio::time::timeout(self.timeout, slot.adapter.create_chat_completion_stream(request))
            .await
            .map_err(|_| format!("timed out after {:?}", self.timeout))?
            .map_err(|e| e.to_string())?;

        // The first non-empty chunk decides whether this provider is usable
        let first = loop {
            match tokio::time::timeout(self.timeout, upstream.next()).await {
                Err(_) => return Err(format!("no output within {:?}", self.timeout)),
                Ok(None) => return Err("empty completion".to_string()),
                Ok(Some(Err(e))) => return Err(e.to_string()),
                Ok(Some(Ok(chunk))) if chunk.is_empty() => continue,
                Ok(Some(Ok(chunk))) => break chunk,
            }
        };

        let idle = self.timeout;
        let rest = stream::unfold(Some(upstream), move |state| async move {
            let mut upstream = state?;
            match tokio::time::timeout(idle, upstream.next()).await {
                Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(upstream))),
                Ok(Some(Err(e))) => Some((Err(GenerationError::Unavailable(e.to_string())), None)),
                Ok(None) => None,
                Err(_) => Some((
                    Err(GenerationError::Unavailable(format!("stream stalled for {:?}", idle))),
                    None,
                )),
            }
        });

        Ok(stream::once(async move { Ok(first) }).chain(rest).boxed())
    }
}

#[async_trait]
impl TextGenerator for LlmGateway {
    async fn generate(
        &self,
        prompt: &str,
        context: &[LLMMessage],
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        let mut last_error = "no provider configured".to_string();

        for slot in &self.slots {
            let request = self.request_for(slot, prompt, context, options);
            let outcome = tokio::time::timeout(self.timeout, slot.adapter.create_chat_completion(&request)).await;

            match outcome {
                Ok(Ok(response)) if !response.content.trim().is_empty() => {
                    debug!(
                        provider = %slot.provider,
                        tokens = response.usage.total_tokens,
                        "Generation succeeded"
                    );
                    return Ok(response.content);
                }
                Ok(Ok(_)) => last_error = format!("{} returned an empty completion", slot.provider),
                Ok(Err(e)) => last_error = format!("{}: {}", slot.provider, e),
                Err(_) => last_error = format!("{} timed out after {:?}", slot.provider, self.timeout),
            }
            warn!(error = %last_error, "Generation attempt failed");
        }

        Err(GenerationError::Unavailable(last_error))
    }

    async fn classify(&self, message: &str, labels: &[&str]) -> Result<String, GenerationError> {
        let options = GenerationOptions::with_system(
            "You route travel-planning requests. Answer with a single category name.",
        )
        .max_tokens(10)
        .temperature(0.0);

        let answer = self
            .generate(&classification_prompt(message, labels), &[], &options)
            .await?;

        parse_label(&answer, labels).ok_or(GenerationError::Malformed(answer))
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        context: &[LLMMessage],
        options: &GenerationOptions,
    ) -> Result<TextStream, GenerationError> {
        let mut last_error = "no provider configured".to_string();

        for slot in &self.slots {
            let request = self.request_for(slot, prompt, context, options);
            match self.open_stream(slot, &request).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    last_error = format!("{}: {}", slot.provider, e);
                    warn!(error = %last_error, "Streaming attempt failed");
                }
            }
        }

        Err(GenerationError::Unavailable(last_error))
    }

    fn call_budget(&self) -> Duration {
        self.timeout * self.slots.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AppError, AppResult, LLMResponse, TokenUsage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    enum Behavior {
        Reply(&'static str),
        Fail,
        Hang,
    }

    struct ScriptedAdapter {
        behavior: Behavior,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LLMAdapter for ScriptedAdapter {
        async fn create_chat_completion(&self, _request: &LLMRequest) -> AppResult<LLMResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Reply(text) => Ok(LLMResponse {
                    content: text.to_string(),
                    finish_reason: "stop".to_string(),
                    usage: TokenUsage::default(),
                }),
                Behavior::Fail => Err(AppError::LLMApi("boom".to_string())),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Err(AppError::LLMApi("unreachable".to_string()))
                }
            }
        }
    }

    fn gateway(primary: Behavior, secondary: Behavior) -> (LlmGateway, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let first_calls = Arc::new(AtomicUsize::new(0));
        let second_calls = Arc::new(AtomicUsize::new(0));
        let gateway = LlmGateway::with_adapters(
            vec![
                (
                    Provider::Gemini,
                    "gemini-1.5-flash".to_string(),
                    Box::new(ScriptedAdapter {
                        behavior: primary,
                        calls: first_calls.clone(),
                    }) as Box<dyn LLMAdapter>,
                ),
                (
                    Provider::OpenAI,
                    "gpt-4o-mini".to_string(),
                    Box::new(ScriptedAdapter {
                        behavior: secondary,
                        calls: second_calls.clone(),
                    }) as Box<dyn LLMAdapter>,
                ),
            ],
            Duration::from_millis(50),
        );
        (gateway, first_calls, second_calls)
    }

    #[test]
    fn test_parse_label() {
        let labels = ["accommodation", "food", "general"];
        assert_eq!(parse_label("food", &labels).as_deref(), Some("food"));
        assert_eq!(parse_label("  Food.\n", &labels).as_deref(), Some("food"));
        assert_eq!(
            parse_label("The category is accommodation", &labels).as_deref(),
            Some("accommodation")
        );
        assert_eq!(parse_label("food or general", &labels), None);
        assert_eq!(parse_label("weather", &labels), None);
    }

    #[tokio::test]
    async fn test_primary_success_skips_secondary() {
        let (gateway, first, second) = gateway(Behavior::Reply("xin chào"), Behavior::Reply("hello"));
        let text = gateway.generate("hi", &[], &GenerationOptions::default()).await.unwrap();
        assert_eq!(text, "xin chào");
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_primary_timeout_falls_back_to_secondary() {
        let (gateway, _, second) = gateway(Behavior::Hang, Behavior::Reply("fallback"));
        let text = gateway.generate("hi", &[], &GenerationOptions::default()).await.unwrap();
        assert_eq!(text, "fallback");
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_completion_counts_as_failure() {
        let (gateway, _, _) = gateway(Behavior::Reply("   "), Behavior::Fail);
        let err = gateway.generate("hi", &[], &GenerationOptions::default()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_no_providers_is_unavailable() {
        let gateway = LlmGateway::with_adapters(Vec::new(), Duration::from_millis(10));
        assert!(gateway.providers().is_empty());
        assert_eq!(gateway.call_budget(), Duration::ZERO);
        let err = gateway.classify("hi", &["food"]).await.unwrap_err();
        assert!(matches!(err, GenerationError::Unavailable(_)));
    }

    #[test]
    fn test_call_budget_covers_every_slot() {
        let (gateway, _, _) = gateway(Behavior::Hang, Behavior::Hang);
        assert_eq!(gateway.call_budget(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_classify_rejects_unknown_label() {
        let (gateway, _, _) = gateway(Behavior::Reply("weather"), Behavior::Fail);
        let err = gateway.classify("is it raining", &["food", "general"]).await.unwrap_err();
        assert!(matches!(err, GenerationError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_stream_falls_back_to_single_chunk() {
        let (gateway, _, _) = gateway(Behavior::Fail, Behavior::Reply("một chunk"));
        let stream = gateway
            .generate_stream("hi", &[], &GenerationOptions::default())
            .await
            .unwrap();
        let chunks: Vec<String> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks, vec!["một chunk".to_string()]);
    }
}
