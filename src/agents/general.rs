//! General Agent
//!
//! Catch-all for greetings and questions outside the specialised agents. This
//! is the one agent that streams tokens as the model produces them.

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{info, warn};

use super::shared::{self, STYLE_GUIDE};
use super::{Agent, AgentDeps, AgentError, AgentRequest, AgentResponse, AgentType};
use crate::llm::GenerationOptions;

const SYSTEM_PROMPT: &str = "Bạn là trợ lý du lịch Việt Nam thân thiện. Bạn có thể giúp người dùng \
tìm khách sạn và chỗ ở, gợi ý món ăn và nhà hàng, tư vấn phương tiện di chuyển, \
lập lịch trình tham quan và tính toán ngân sách chuyến đi. \
Với câu hỏi ngoài các chủ đề trên, hãy trả lời ngắn gọn rồi gợi ý người dùng hỏi về chuyến đi.";

pub struct GeneralAgent {
    deps: AgentDeps,
}

impl GeneralAgent {
    pub fn new(deps: AgentDeps) -> Self {
        Self { deps }
    }

    fn prompt(request: &AgentRequest) -> String {
        match &request.trip {
            Some(trip) => format!(
                "Thông tin chuyến đi hiện tại:\n{}\n\nNgười dùng: {}",
                shared::trip_summary(trip),
                request.message
            ),
            None => request.message.clone(),
        }
    }

    fn options() -> GenerationOptions {
        GenerationOptions::with_system(format!("{} {}", SYSTEM_PROMPT, STYLE_GUIDE))
    }

    fn reply(message: String) -> AgentResponse {
        AgentResponse::new(AgentType::General, message)
            .with_suggestions(AgentType::General.default_suggestions().iter().copied())
    }
}

#[async_trait]
impl Agent for GeneralAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::General
    }

    async fn respond(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError> {
        let context = shared::history_messages(&request.history);
        let message = match self
            .deps
            .generator
            .generate(&Self::prompt(request), &context, &Self::options())
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "General reply generation failed, using canned reply");
                AgentType::General.canned_reply().to_string()
            }
        };
        Ok(Self::reply(message))
    }

    async fn respond_streaming(
        &self,
        request: &AgentRequest,
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<AgentResponse, AgentError> {
        let context = shared::history_messages(&request.history);
        let stream = self
            .deps
            .generator
            .generate_stream(&Self::prompt(request), &context, &Self::options())
            .await;

        let mut stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "General stream unavailable, using canned reply");
                let canned = AgentType::General.canned_reply();
                on_chunk(canned);
                return Ok(Self::reply(canned.to_string()));
            }
        };

        let mut full = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(text) if text.is_empty() => {}
                Ok(text) => {
                    on_chunk(&text);
                    full.push_str(&text);
                }
                Err(e) => {
                    // Keep what the client already received
                    warn!(error = %e, received = full.len(), "General stream broke off");
                    break;
                }
            }
        }

        if full.trim().is_empty() {
            let canned = AgentType::General.canned_reply();
            on_chunk(canned);
            full = canned.to_string();
        }

        info!(response_len = full.len(), "General reply streamed");
        Ok(Self::reply(full))
    }
}
