//! Conversation context assembly.
//!
//! The persistence collaborator sits behind [`ConversationStore`]; the
//! assembler turns a chat request's ids into the bounded context the router
//! needs.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::{Conversation, Message, NewMessage, TripContext};
use crate::types::{AppError, AppResult};

const TITLE_CHARS: usize = 50;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Short name reported by the health endpoint
    fn kind(&self) -> &'static str;

    async fn create_conversation(
        &self,
        user_id: i64,
        trip_id: Option<i64>,
        title: Option<String>,
    ) -> AppResult<Conversation>;

    async fn get_conversation(&self, conversation_id: i64) -> AppResult<Option<Conversation>>;

    /// At most `limit` latest messages of one conversation, oldest first
    async fn get_recent_messages(&self, conversation_id: i64, limit: usize) -> AppResult<Vec<Message>>;

    async fn append_message(&self, message: NewMessage) -> AppResult<Message>;

    async fn get_trip_snapshot(&self, trip_id: i64) -> AppResult<Option<TripContext>>;
}

#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub conversation: Conversation,
    pub history: Vec<Message>,
    pub trip: Option<TripContext>,
    /// The conversation was opened by this request
    pub created: bool,
}

pub struct ContextAssembler {
    store: Arc<dyn ConversationStore>,
    history_window: usize,
}

impl ContextAssembler {
    pub fn new(store: Arc<dyn ConversationStore>, history_window: usize) -> Self {
        Self { store, history_window }
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub async fn assemble(
        &self,
        user_id: i64,
        conversation_id: Option<i64>,
        trip_id: Option<i64>,
        first_message: &str,
    ) -> AppResult<AssembledContext> {
        // An explicit trip must resolve before anything is written
        let explicit_trip = match trip_id {
            Some(id) => Some(
                self.store
                    .get_trip_snapshot(id)
                    .await?
                    .ok_or(AppError::InvalidTripReference(id))?,
            ),
            None => None,
        };

        let (conversation, created) = match conversation_id {
            Some(id) => {
                let conversation = self
                    .store
                    .get_conversation(id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("conversation {}", id)))?;
                if conversation.user_id != user_id {
                    return Err(AppError::Auth(format!(
                        "conversation {} belongs to another user",
                        id
                    )));
                }
                (conversation, false)
            }
            None => {
                let conversation = self
                    .store
                    .create_conversation(user_id, trip_id, title_from(first_message))
                    .await?;
                debug!(conversation_id = conversation.id, "Conversation created");
                (conversation, true)
            }
        };

        let history = if created {
            Vec::new()
        } else {
            self.store
                .get_recent_messages(conversation.id, self.history_window)
                .await?
        };

        let trip = match (explicit_trip, conversation.trip_id) {
            (Some(trip), _) => Some(trip),
            (None, Some(linked)) => {
                let snapshot = self.store.get_trip_snapshot(linked).await?;
                if snapshot.is_none() {
                    warn!(trip_id = linked, conversation_id = conversation.id, "Linked trip is gone");
                }
                snapshot
            }
            (None, None) => None,
        };

        Ok(AssembledContext {
            conversation,
            history,
            trip,
            created,
        })
    }
}

fn title_from(message: &str) -> Option<String> {
    let title: String = message.trim().chars().take(TITLE_CHARS).collect();
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryStore;

    fn assembler(store: Arc<InMemoryStore>, window: usize) -> ContextAssembler {
        ContextAssembler::new(store, window)
    }

    #[tokio::test]
    async fn test_new_conversation_gets_title_and_no_history() {
        let store = Arc::new(InMemoryStore::new());
        let message = "Tôi muốn lên kế hoạch cho chuyến đi Đà Nẵng cùng gia đình vào tháng sau";
        let context = assembler(store, 20).assemble(1, None, None, message).await.unwrap();

        assert!(context.created);
        assert!(context.history.is_empty());
        assert!(context.trip.is_none());
        let title = context.conversation.title.unwrap();
        assert_eq!(title.chars().count(), 50);
        assert!(message.starts_with(&title));
    }

    #[tokio::test]
    async fn test_history_window_returns_latest_in_order() {
        let store = Arc::new(InMemoryStore::new());
        let conversation = store.create_conversation(1, None, None).await.unwrap();
        for i in 0..30 {
            store
                .append_message(NewMessage::user(conversation.id, format!("m{}", i)))
                .await
                .unwrap();
        }

        let context = assembler(store, 20)
            .assemble(1, Some(conversation.id), None, "next")
            .await
            .unwrap();
        let contents: Vec<String> = context.history.iter().map(|m| m.content.clone()).collect();
        let expected: Vec<String> = (10..30).map(|i| format!("m{}", i)).collect();
        assert_eq!(contents, expected);
    }

    #[tokio::test]
    async fn test_history_never_crosses_conversations() {
        let store = Arc::new(InMemoryStore::new());
        let mine = store.create_conversation(1, None, None).await.unwrap();
        let other = store.create_conversation(1, None, None).await.unwrap();
        store.append_message(NewMessage::user(other.id, "elsewhere")).await.unwrap();
        store.append_message(NewMessage::user(mine.id, "here")).await.unwrap();

        let context = assembler(store, 20).assemble(1, Some(mine.id), None, "x").await.unwrap();
        assert_eq!(context.history.len(), 1);
        assert_eq!(context.history[0].content, "here");
    }

    #[tokio::test]
    async fn test_unresolved_trip_is_rejected_before_creating() {
        let store = Arc::new(InMemoryStore::new());
        let result = assembler(store.clone(), 20).assemble(1, None, Some(99), "hi").await;
        assert!(matches!(result, Err(AppError::InvalidTripReference(99))));
        assert!(store.get_conversation(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_and_foreign_conversations() {
        let store = Arc::new(InMemoryStore::new());
        let conversation = store.create_conversation(1, None, None).await.unwrap();
        let assembler = assembler(store, 20);

        let result = assembler.assemble(1, Some(conversation.id + 100), None, "hi").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        let result = assembler.assemble(2, Some(conversation.id), None, "hi").await;
        assert!(matches!(result, Err(AppError::Auth(_))));
    }

    #[tokio::test]
    async fn test_linked_trip_used_when_no_explicit_trip() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_trip(TripContext::new(7, "Huế"));
        let conversation = store.create_conversation(1, Some(7), None).await.unwrap();

        let context = assembler(store.clone(), 20)
            .assemble(1, Some(conversation.id), None, "hi")
            .await
            .unwrap();
        assert_eq!(context.trip.map(|t| t.destination), Some("Huế".to_string()));

        store.insert_trip(TripContext::new(8, "Sa Pa"));
        let context = assembler(store, 20)
            .assemble(1, Some(conversation.id), Some(8), "hi")
            .await
            .unwrap();
        assert_eq!(context.trip.map(|t| t.destination), Some("Sa Pa".to_string()));
    }
}
