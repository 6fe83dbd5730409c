//! In-memory conversation history
//!
//! Conversations are keyed by an opaque id and grow monotonically; nothing is
//! ever evicted. Each conversation sits behind its own async mutex so that two
//! utterances for the same id are handled one after the other, while
//! different conversations never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Who authored a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Exclusive access to one stored conversation for the duration of a turn
pub type ConversationGuard = OwnedMutexGuard<Vec<Turn>>;

/// Generate a new, time-ordered conversation id
pub fn new_conversation_id() -> String {
    Uuid::now_v7().to_string()
}

/// Process-wide conversation store
#[derive(Debug, Default)]
pub struct HistoryStore {
    conversations: Mutex<HashMap<String, Arc<AsyncMutex<Vec<Turn>>>>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: &str) -> Option<Arc<AsyncMutex<Vec<Turn>>>> {
        self.conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Number of stored conversations
    pub fn len(&self) -> usize {
        self.conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of a conversation's turns
    #[cfg(test)]
    pub async fn get(&self, id: &str) -> Option<Vec<Turn>> {
        let slot = self.slot(id)?;
        let turns = slot.lock().await;
        Some(turns.clone())
    }

    /// Store a freshly seeded conversation. An existing conversation with the
    /// same id is left untouched.
    pub fn insert(&self, id: &str, turns: Vec<Turn>) {
        self.conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(turns)));
    }

    /// Lock a conversation for a whole turn. Returns `None` for unknown ids.
    /// Turns are appended through the guard, so the append happens under the
    /// same lock as the read that built the request.
    pub async fn lock(&self, id: &str) -> Option<ConversationGuard> {
        let slot = self.slot(id)?;
        Some(slot.lock_owned().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_turn_serializes_lowercase_role() {
        let json = serde_json::to_value(Turn::assistant("Ok!")).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "Ok!");
    }

    #[test]
    fn test_conversation_ids_are_unique_and_sortable() {
        let first = new_conversation_id();
        std::thread::sleep(Duration::from_millis(2));
        let second = new_conversation_id();

        assert_ne!(first, second);
        assert!(first < second);
    }

    #[tokio::test]
    async fn test_append_through_guard_grows() {
        let store = HistoryStore::new();
        assert!(store.is_empty());
        assert!(store.get("abc").await.is_none());

        store.insert("abc", vec![Turn::user("hello")]);
        store
            .lock("abc")
            .await
            .unwrap()
            .push(Turn::assistant("hi"));

        let turns = store.get("abc").await.unwrap();
        assert_eq!(turns, vec![Turn::user("hello"), Turn::assistant("hi")]);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_insert_does_not_reset_existing() {
        let store = HistoryStore::new();
        store.insert("abc", vec![Turn::user("one")]);
        store.insert("abc", vec![Turn::user("two")]);

        assert_eq!(store.get("abc").await.unwrap(), vec![Turn::user("one")]);
    }

    #[tokio::test]
    async fn test_lock_serializes_same_conversation() {
        let store = Arc::new(HistoryStore::new());
        store.insert("abc", Vec::new());

        let mut guard = store.lock("abc").await.unwrap();

        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let guard = store.lock("abc").await.unwrap();
                guard.len()
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        guard.push(Turn::user("first"));
        drop(guard);

        assert_eq!(waiter.await.unwrap(), 1);
        assert!(store.lock("missing").await.is_none());
    }
}
