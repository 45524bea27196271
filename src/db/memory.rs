use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::context::ConversationStore;
use crate::models::{Conversation, Message, NewMessage, TripContext};
use crate::types::{AppError, AppResult};

#[derive(Default)]
struct Tables {
    sequence: i64,
    conversations: HashMap<i64, Conversation>,
    /// Append order is id order
    messages: Vec<Message>,
    trips: HashMap<i64, TripContext>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.sequence += 1;
        self.sequence
    }
}

/// Process-local store for development and tests
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        // A panic while holding the lock leaves the maps consistent
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed a trip snapshot, replacing any with the same id
    pub fn insert_trip(&self, trip: TripContext) {
        self.tables().trips.insert(trip.trip_id, trip);
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn create_conversation(
        &self,
        user_id: i64,
        trip_id: Option<i64>,
        title: Option<String>,
    ) -> AppResult<Conversation> {
        let mut tables = self.tables();
        let now = Utc::now();
        let conversation = Conversation {
            id: tables.next_id(),
            user_id,
            trip_id,
            title,
            created_at: now,
            updated_at: now,
        };
        tables.conversations.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn get_conversation(&self, conversation_id: i64) -> AppResult<Option<Conversation>> {
        Ok(self.tables().conversations.get(&conversation_id).cloned())
    }

    async fn get_recent_messages(&self, conversation_id: i64, limit: usize) -> AppResult<Vec<Message>> {
        let tables = self.tables();
        let mut recent: Vec<Message> = tables
            .messages
            .iter()
            .rev()
            .filter(|m| m.conversation_id == conversation_id)
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        Ok(recent)
    }

    async fn append_message(&self, message: NewMessage) -> AppResult<Message> {
        let mut tables = self.tables();
        let now = Utc::now();

        let id = tables.next_id();
        let conversation = tables
            .conversations
            .get_mut(&message.conversation_id)
            .ok_or_else(|| AppError::NotFound(format!("conversation {}", message.conversation_id)))?;
        conversation.updated_at = now;

        let stored = Message {
            id,
            conversation_id: message.conversation_id,
            role: message.role,
            content: message.content,
            agent_type: message.agent_type,
            metadata: message.metadata,
            created_at: now,
        };
        tables.messages.push(stored.clone());
        Ok(stored)
    }

    async fn get_trip_snapshot(&self, trip_id: i64) -> AppResult<Option<TripContext>> {
        Ok(self.tables().trips.get(&trip_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_append_keeps_order_and_touches_conversation() {
        let store = InMemoryStore::new();
        let conversation = store.create_conversation(3, None, Some("Huế".into())).await.unwrap();

        let first = assert_ok!(store.append_message(NewMessage::user(conversation.id, "một")).await);
        let second = assert_ok!(store.append_message(NewMessage::user(conversation.id, "hai")).await);
        assert!(second.id > first.id);
        assert_eq!(first.role, Role::User);

        let updated = store.get_conversation(conversation.id).await.unwrap().unwrap();
        assert!(updated.updated_at >= conversation.updated_at);

        let recent = store.get_recent_messages(conversation.id, 1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].content, "hai");
    }

    #[tokio::test]
    async fn test_append_to_missing_conversation() {
        let store = InMemoryStore::new();
        let err = assert_err!(store.append_message(NewMessage::user(42, "lost")).await);
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
