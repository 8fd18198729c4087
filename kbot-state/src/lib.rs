//! # kbot-state
//!
//! Per-chat record of the main message and its keyboard. Each chat has its own async mutex
//! inside a sharded map, so events of one chat serialize while different chats never contend.
//! State is in-memory only and lives as long as the process.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use kbot_core::{KeyboardId, MessageId};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// What the framework remembers about one chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatState {
    pub chat_id: i64,
    /// Message handlers update in place.
    pub main_message: Option<MessageId>,
    /// Registration scope of the keyboard currently attached to the main message.
    pub last_keyboard: Option<KeyboardId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatState {
    pub fn new(chat_id: i64) -> Self {
        let now = Utc::now();
        Self {
            chat_id,
            main_message: None,
            last_keyboard: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Records a new main message and keyboard; returns the keyboard scope it replaces,
    /// if that scope differs from the new one.
    pub fn set_main(
        &mut self,
        message_id: MessageId,
        keyboard: Option<KeyboardId>,
    ) -> Option<KeyboardId> {
        let previous = std::mem::replace(&mut self.last_keyboard, keyboard);
        self.main_message = Some(message_id);
        self.updated_at = Utc::now();
        previous.filter(|prev| Some(*prev) != keyboard)
    }
}

/// Exclusive access to one chat's state; dropping it lets the next event of the chat run.
pub type ChatGuard = OwnedMutexGuard<ChatState>;

/// Sharded map of chat id to per-chat locked state.
#[derive(Clone, Default)]
pub struct ChatStateStore {
    chats: Arc<DashMap<i64, Arc<Mutex<ChatState>>>>,
}

impl ChatStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the chat's slot, creating the state on first contact.
    /// The map shard is released before the caller awaits the slot's lock.
    pub fn get_or_create(&self, chat_id: i64) -> Arc<Mutex<ChatState>> {
        self.chats
            .entry(chat_id)
            .or_insert_with(|| {
                debug!(chat_id = chat_id, "chat state created");
                Arc::new(Mutex::new(ChatState::new(chat_id)))
            })
            .clone()
    }

    /// Waits for exclusive access to the chat's state.
    pub async fn lock(&self, chat_id: i64) -> ChatGuard {
        self.get_or_create(chat_id).lock_owned().await
    }

    /// Snapshot of the chat's state, waiting for any running handler of that chat.
    pub async fn get(&self, chat_id: i64) -> Option<ChatState> {
        let slot = self.chats.get(&chat_id).map(|s| Arc::clone(s.value()))?;
        let state = slot.lock().await;
        Some(state.clone())
    }

    /// Snapshot without waiting; `None` when absent or currently locked.
    pub fn try_get(&self, chat_id: i64) -> Option<ChatState> {
        let slot = self.chats.get(&chat_id).map(|s| Arc::clone(s.value()))?;
        let state = slot.try_lock().ok()?;
        Some(state.clone())
    }

    /// Sets the main message outside a handler; the keyboard scope is left untouched.
    pub async fn set_main_message(&self, chat_id: i64, message_id: MessageId) {
        let mut state = self.lock(chat_id).await;
        state.main_message = Some(message_id);
        state.updated_at = Utc::now();
    }

    /// True while some task holds the chat's guard.
    pub fn is_locked(&self, chat_id: i64) -> bool {
        self.chats
            .get(&chat_id)
            .map(|s| s.value().try_lock().is_err())
            .unwrap_or(false)
    }

    /// Chats currently locked.
    pub fn locked_chats(&self) -> Vec<i64> {
        self.chats
            .iter()
            .filter(|entry| entry.value().try_lock().is_err())
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_set_main_reports_superseded_scope() {
        let mut state = ChatState::new(1);
        assert_eq!(state.set_main(MessageId(10), Some(KeyboardId(1))), None);
        assert_eq!(
            state.set_main(MessageId(10), Some(KeyboardId(2))),
            Some(KeyboardId(1))
        );
        // Same scope again is not a replacement.
        assert_eq!(state.set_main(MessageId(11), Some(KeyboardId(2))), None);
        assert_eq!(state.set_main(MessageId(11), None), Some(KeyboardId(2)));
        assert_eq!(state.main_message, Some(MessageId(11)));
        assert!(state.updated_at >= state.created_at);
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let store = ChatStateStore::new();
        assert!(store.get(5).await.is_none());

        let a = store.get_or_create(5);
        let b = store.get_or_create(5);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 1);

        store.set_main_message(5, MessageId(3)).await;
        assert_eq!(
            store.get(5).await.and_then(|s| s.main_message),
            Some(MessageId(3))
        );
    }

    #[tokio::test]
    async fn test_lock_is_per_chat() {
        let store = ChatStateStore::new();
        let guard = store.lock(1).await;
        assert!(store.is_locked(1));
        assert!(store.try_get(1).is_none());

        // Another chat is not blocked by chat 1.
        let other = tokio::time::timeout(Duration::from_millis(100), store.lock(2)).await;
        assert!(other.is_ok());
        drop(other);

        // Same chat waits until the guard is dropped.
        let same = tokio::time::timeout(Duration::from_millis(50), store.lock(1)).await;
        assert!(same.is_err());

        drop(guard);
        assert!(!store.is_locked(1));
        assert!(store.locked_chats().is_empty());
        assert_eq!(store.try_get(1).map(|s| s.chat_id), Some(1));
    }

    #[tokio::test]
    async fn test_same_chat_mutations_serialize() {
        let store = ChatStateStore::new();
        let mut tasks = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let mut state = store.lock(9).await;
                let seen = state.main_message.map(|m| m.0).unwrap_or(0);
                tokio::task::yield_now().await;
                state.main_message = Some(MessageId(seen + 1));
                i
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(
            store.get(9).await.and_then(|s| s.main_message),
            Some(MessageId(32))
        );
    }
}
