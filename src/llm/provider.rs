use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;

use crate::config::LLMConfig;
use crate::types::{AppError, AppResult, LLMRequest, LLMResponse};

#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse>;

    fn supports_streaming(&self) -> bool {
        false
    }

    /// Incremental completion. Providers without a streaming endpoint report an error
    /// and callers fall back to a single non-streamed completion.
    async fn create_chat_completion_stream(
        &self,
        _request: &LLMRequest,
    ) -> AppResult<BoxStream<'static, AppResult<String>>> {
        Err(AppError::LLMApi("streaming not supported by this provider".to_string()))
    }
}

/// Supported text-generation vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAI,
    Gemini,
    Groq,
    OpenRouter,
}

impl Provider {
    pub fn from_id(id: &str) -> Option<Self> {
        match id.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Provider::OpenAI),
            "gemini" | "google" => Some(Provider::Gemini),
            "groq" => Some(Provider::Groq),
            "openrouter" => Some(Provider::OpenRouter),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Provider::OpenAI => "openai",
            Provider::Gemini => "gemini",
            Provider::Groq => "groq",
            Provider::OpenRouter => "openrouter",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Configuration for one provider slot of the gateway
#[derive(Debug, Clone)]
pub struct LLMProviderConfig {
    pub provider: Provider,
    pub model: String,
    pub api_key: String,
}

impl LLMProviderConfig {
    /// Resolve a slot from configuration. Returns `None` when the provider id is
    /// unknown or no API key is configured for it.
    pub fn resolve(config: &LLMConfig, provider_id: &str, model: &str) -> Option<Self> {
        let provider = Provider::from_id(provider_id)?;
        let api_key = config.api_key_for(provider.id())?;
        Some(Self {
            provider,
            model: model.to_string(),
            api_key,
        })
    }
}

pub fn build_adapter(config: &LLMProviderConfig) -> AppResult<Box<dyn LLMAdapter>> {
    if config.api_key.trim().is_empty() {
        return Err(AppError::Auth(format!("missing API key for {}", config.provider)));
    }

    let adapter: Box<dyn LLMAdapter> = match config.provider {
        Provider::OpenAI => Box::new(crate::llm::openai::OpenAIAdapter::new(&config.api_key)),
        Provider::Gemini => Box::new(crate::llm::google::GoogleAdapter::new(&config.api_key)),
        Provider::Groq => Box::new(crate::llm::groq::GroqAdapter::new(&config.api_key)),
        Provider::OpenRouter => {
            Box::new(crate::llm::openrouter::OpenRouterAdapter::new(&config.api_key))
        }
    };

    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_from_id() {
        assert_eq!(Provider::from_id("OpenAI"), Some(Provider::OpenAI));
        assert_eq!(Provider::from_id("google"), Some(Provider::Gemini));
        assert_eq!(Provider::from_id("groq"), Some(Provider::Groq));
        assert_eq!(Provider::from_id("anthropic"), None);
        assert_eq!(Provider::OpenRouter.to_string(), "openrouter");
    }

    #[test]
    fn test_resolve_requires_key() {
        let mut config = LLMConfig::default();
        assert!(LLMProviderConfig::resolve(&config, "groq", "llama-3.1-8b-instant").is_none());

        config.groq_api_key = "gsk-test".to_string();
        let slot = LLMProviderConfig::resolve(&config, "groq", "llama-3.1-8b-instant").unwrap();
        assert_eq!(slot.provider, Provider::Groq);
        assert_eq!(slot.model, "llama-3.1-8b-instant");
    }

    #[test]
    fn test_build_adapter_rejects_empty_key() {
        let slot = LLMProviderConfig {
            provider: Provider::OpenAI,
            model: "gpt-4o-mini".to_string(),
            api_key: String::new(),
        };
        assert!(matches!(build_adapter(&slot), Err(AppError::Auth(_))));
    }
}
