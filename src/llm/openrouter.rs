// OpenRouter speaks the OpenAI wire format and asks clients to identify themselves

use crate::llm::{AppResult, LLMAdapter, LLMRequest, LLMResponse};
use async_trait::async_trait;
use futures::stream::BoxStream;

const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
const APP_TITLE: &str = "Oxidized Travel";

pub struct OpenRouterAdapter {
    inner: crate::llm::openai::OpenAIAdapter,
}

impl OpenRouterAdapter {
    pub fn new(api_key: &str) -> Self {
        Self {
            inner: crate::llm::openai::OpenAIAdapter::new_with_api_base(
                api_key,
                OPENROUTER_API_BASE,
            )
            .with_header("X-Title", APP_TITLE),
        }
    }
}

#[async_trait]
impl LLMAdapter for OpenRouterAdapter {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        self.inner.create_chat_completion(request).await
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn create_chat_completion_stream(
        &self,
        request: &LLMRequest,
    ) -> AppResult<BoxStream<'static, AppResult<String>>> {
        self.inner.create_chat_completion_stream(request).await
    }
}
