//! Incremental routing output.
//!
//! A routed stream is a run of [`ResponseEvent::Delta`] frames closed by
//! exactly one [`ResponseEvent::Final`]. A stream that ends without the final
//! frame means generation was cut off.

use futures::{Stream, StreamExt};
use serde::Serialize;

use crate::agents::AgentResponse;
use crate::llm::GenerationError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResponseEvent {
    Delta { content: String },
    Final(AgentResponse),
}

impl ResponseEvent {
    pub fn delta(content: impl Into<String>) -> Self {
        ResponseEvent::Delta {
            content: content.into(),
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, ResponseEvent::Final(_))
    }
}

/// Drain a routed stream into its final response and the concatenated deltas
pub async fn collect_events<S>(events: S) -> Result<(AgentResponse, String), GenerationError>
where
    S: Stream<Item = ResponseEvent>,
{
    futures::pin_mut!(events);

    let mut streamed = String::new();
    while let Some(event) = events.next().await {
        match event {
            ResponseEvent::Delta { content } => streamed.push_str(&content),
            ResponseEvent::Final(response) => return Ok((response, streamed)),
        }
    }

    Err(GenerationError::Unavailable(
        "stream closed before the final frame".to_string(),
    ))
}
