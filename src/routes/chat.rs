use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::post,
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;
use validator::Validate;

use crate::agents::{AgentAction, AgentData, AgentResponse};
use crate::context::{AssembledContext, ConversationStore};
use crate::middleware::UserId;
use crate::models::{AppState, ChatRequest, ChatResponse, NewMessage};
use crate::streaming::ResponseEvent;
use crate::types::{AppError, AppResult};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(post_chat))
        .route("/api/chat/stream", post(post_chat_stream))
        .with_state(state)
}

/// Stored alongside the assistant message so the client can redraw cards
#[derive(Serialize)]
struct ReplyMetadata<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a AgentData>,
    suggestions: &'a [String],
    actions: &'a [AgentAction],
}

pub async fn post_chat(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(request): Json<ChatRequest>,
) -> AppResult<Json<ChatResponse>> {
    let request_id = Uuid::new_v4();
    let span = info_span!("chat", %request_id, user_id);

    async move {
        let context = prepare(&state, user_id, &request).await?;
        let conversation_id = context.conversation.id;

        let response = state
            .router
            .route(&request.message, &context.history, context.trip.as_ref())
            .await;

        let reply = record_reply(state.store.as_ref(), conversation_id, response).await?;
        info!(conversation_id, agent = %reply.agent_type, "Chat reply sent");
        Ok(Json(reply))
    }
    .instrument(span)
    .await
}

pub async fn post_chat_stream(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(request): Json<ChatRequest>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let request_id = Uuid::new_v4();
    let span = info_span!("chat_stream", %request_id, user_id);

    let context = prepare(&state, user_id, &request)
        .instrument(span.clone())
        .await?;
    let conversation_id = context.conversation.id;
    span.in_scope(|| info!(conversation_id, "Chat stream opened"));

    let store = state.store.clone();
    let router = state.router.clone();
    // Routing runs in the span current when the stream is built
    let events = span
        .in_scope(|| router.route_stream(request.message, context.history, context.trip))
        .then(move |event| {
            let store = Arc::clone(&store);
            async move { to_sse(store.as_ref(), conversation_id, event).await }.instrument(span.clone())
        });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn to_sse(
    store: &dyn ConversationStore,
    conversation_id: i64,
    event: ResponseEvent,
) -> Result<Event, axum::Error> {
    match event {
        ResponseEvent::Delta { content } => Event::default()
            .event("delta")
            .json_data(serde_json::json!({ "content": content })),
        ResponseEvent::Final(response) => match record_reply(store, conversation_id, response).await {
            Ok(reply) => Event::default().event("final").json_data(reply),
            Err(e) => {
                error!(conversation_id, error = %e, "Failed to store streamed reply");
                Ok(Event::default().event("error").data("reply could not be saved"))
            }
        },
    }
}

/// Validate, assemble context and persist the user's message
async fn prepare(state: &AppState, user_id: i64, request: &ChatRequest) -> AppResult<AssembledContext> {
    request
        .validate()
        .map_err(|e| AppError::InvalidRequest(e.to_string()))?;
    if request.message.trim().is_empty() {
        return Err(AppError::InvalidRequest("message is blank".to_string()));
    }

    let context = state
        .assembler
        .assemble(user_id, request.conversation_id, request.trip_id, &request.message)
        .await?;

    state
        .store
        .append_message(NewMessage::user(context.conversation.id, request.message.as_str()))
        .await?;

    Ok(context)
}

async fn record_reply(
    store: &dyn ConversationStore,
    conversation_id: i64,
    response: AgentResponse,
) -> AppResult<ChatResponse> {
    let metadata = serde_json::to_value(ReplyMetadata {
        data: response.data.as_ref(),
        suggestions: &response.suggestions,
        actions: &response.actions,
    })
    .map_err(|e| AppError::Internal(format!("reply metadata: {}", e)))?;

    let message = store
        .append_message(NewMessage::assistant(
            conversation_id,
            response.message.as_str(),
            response.agent_type,
            Some(metadata),
        ))
        .await?;

    Ok(ChatResponse {
        message,
        conversation_id,
        agent_type: response.agent_type,
        data: response.data,
        suggestions: response.suggestions,
        actions: response.actions,
    })
}
