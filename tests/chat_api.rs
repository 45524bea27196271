use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::NaiveDate;
use serde_json::{json, Value};
use tower::ServiceExt;

use oxidized_travel::context::ConversationStore;
use oxidized_travel::db::InMemoryStore;
use oxidized_travel::llm::LlmGateway;
use oxidized_travel::models::TripContext;
use oxidized_travel::places::PlacesGateway;
use oxidized_travel::{build_state, create_router, Config};

/// App with no reachable providers, backed by an in-memory store
fn app() -> (Router, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let state = build_state(
        Config::default(),
        LlmGateway::with_adapters(Vec::new(), Duration::from_secs(1)),
        PlacesGateway::disabled(),
        store.clone() as Arc<dyn ConversationStore>,
    );
    (create_router(state), store)
}

fn chat(path: &str, user: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, request).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn health_reports_store_kind() {
    let (app, _) = app();
    let request = Request::builder().uri("/api/health").body(Body::empty()).unwrap();
    let (status, body) = send_json(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], "memory");
    assert_eq!(body["llm_providers"], json!([]));
}

#[tokio::test]
async fn chat_requires_user_header() {
    let (app, _) = app();
    let (status, _) = send(&app, chat("/api/chat", None, json!({ "message": "xin chào" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn blank_message_is_rejected() {
    let (app, _) = app();
    let (status, _) = send(&app, chat("/api/chat", Some("1"), json!({ "message": "" }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(&app, chat("/api/chat", Some("1"), json!({ "message": "   " }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn accommodation_question_without_results_still_answers() {
    let (app, store) = app();
    let (status, body) = send_json(
        &app,
        chat("/api/chat", Some("1"), json!({ "message": "Tìm khách sạn ở Đà Nẵng" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["agent_type"], "accommodation");
    assert_eq!(body["message"]["role"], "assistant");
    assert!(!body["message"]["content"].as_str().unwrap().trim().is_empty());
    assert_eq!(body["data"]["kind"], "accommodations");
    assert_eq!(body["data"]["items"], json!([]));
    assert!(!body["suggestions"].as_array().unwrap().is_empty());

    let conversation_id = body["conversation_id"].as_i64().unwrap();
    let stored = store.get_recent_messages(conversation_id, 10).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].content, "Tìm khách sạn ở Đà Nẵng");
    assert_eq!(stored[1].agent_type.as_deref(), Some("accommodation"));
}

#[tokio::test]
async fn follow_up_continues_conversation() {
    let (app, store) = app();
    let (_, first) = send_json(&app, chat("/api/chat", Some("5"), json!({ "message": "xin chào" }))).await;
    let conversation_id = first["conversation_id"].as_i64().unwrap();

    let (status, second) = send_json(
        &app,
        chat(
            "/api/chat",
            Some("5"),
            json!({ "message": "Ngân sách 5 triệu có đủ không?", "conversation_id": conversation_id }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["conversation_id"].as_i64(), Some(conversation_id));
    assert_eq!(second["agent_type"], "budget");
    assert_eq!(store.get_recent_messages(conversation_id, 10).await.unwrap().len(), 4);
}

#[tokio::test]
async fn foreign_or_unknown_references_are_rejected() {
    let (app, _) = app();
    let (_, first) = send_json(&app, chat("/api/chat", Some("1"), json!({ "message": "xin chào" }))).await;
    let conversation_id = first["conversation_id"].as_i64().unwrap();

    let (status, _) = send(
        &app,
        chat("/api/chat", Some("2"), json!({ "message": "hi", "conversation_id": conversation_id })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        chat("/api/chat", Some("1"), json!({ "message": "hi", "conversation_id": 9999 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, chat("/api/chat", Some("1"), json!({ "message": "hi", "trip_id": 77 }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn itinerary_uses_trip_snapshot() {
    let (app, store) = app();
    let mut trip = TripContext::new(3, "Huế");
    trip.start_date = NaiveDate::from_ymd_opt(2025, 6, 1);
    trip.end_date = NaiveDate::from_ymd_opt(2025, 6, 2);
    store.insert_trip(trip);

    let (status, body) = send_json(
        &app,
        chat("/api/chat", Some("1"), json!({ "message": "Lập lịch trình cho chuyến đi", "trip_id": 3 })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["agent_type"], "itinerary");
    assert_eq!(body["data"]["kind"], "activities");
}

#[tokio::test]
async fn stream_ends_with_final_frame() {
    let (app, _) = app();
    let (status, bytes) = send(&app, chat("/api/chat/stream", Some("1"), json!({ "message": "xin chào" }))).await;
    let body = String::from_utf8(bytes).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("event: delta"), "{}", body);
    assert_eq!(body.matches("event: final").count(), 1, "{}", body);
    assert!(body.contains("\"agent_type\":\"general\""), "{}", body);
}
