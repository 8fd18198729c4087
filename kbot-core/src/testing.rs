//! In-memory [`Transport`] for tests.
//!
//! Records every call so tests can assert on sends, edits and acknowledgments without
//! hitting a real chat service. Edit failures can be scripted with [`RecordingTransport::fail_next_edit`].
//! [`text_update`] and [`callback_update`] build inbound updates for a private chat.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{TransportError, TransportResult};
use crate::keyboard::Keyboard;
use crate::transport::Transport;
use crate::types::{CallbackQuery, Chat, Message, MessageId, Update, User};

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Send {
        chat_id: i64,
        text: String,
        keyboard: Option<Keyboard>,
        message_id: MessageId,
    },
    Edit {
        chat_id: i64,
        message_id: MessageId,
        text: String,
        keyboard: Option<Keyboard>,
        result: TransportResult<()>,
    },
    Delete {
        chat_id: i64,
        message_id: MessageId,
    },
    Answer {
        callback_id: String,
        notice: Option<String>,
    },
}

/// Transport double; message ids are handed out from 1 upward.
pub struct RecordingTransport {
    calls: Mutex<Vec<TransportCall>>,
    next_message_id: AtomicI32,
    edit_failures: Mutex<VecDeque<TransportError>>,
    answer_failures: Mutex<VecDeque<TransportError>>,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_message_id: AtomicI32::new(1),
            edit_failures: Mutex::new(VecDeque::new()),
            answer_failures: Mutex::new(VecDeque::new()),
        }
    }

    /// The next `edit_message` call fails with `err` (queued, one per call).
    pub fn fail_next_edit(&self, err: TransportError) {
        lock(&self.edit_failures).push_back(err);
    }

    /// The next `answer_callback` call fails with `err`. Failed answers are still recorded.
    pub fn fail_next_answer(&self, err: TransportError) {
        lock(&self.answer_failures).push_back(err);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        lock(&self.calls).clone()
    }

    pub fn sends(&self) -> Vec<TransportCall> {
        self.filtered(|c| matches!(c, TransportCall::Send { .. }))
    }

    pub fn edits(&self) -> Vec<TransportCall> {
        self.filtered(|c| matches!(c, TransportCall::Edit { .. }))
    }

    pub fn deletes(&self) -> Vec<TransportCall> {
        self.filtered(|c| matches!(c, TransportCall::Delete { .. }))
    }

    pub fn answers(&self) -> Vec<TransportCall> {
        self.filtered(|c| matches!(c, TransportCall::Answer { .. }))
    }

    /// Keyboard attached to the most recent send or successful edit.
    pub fn last_keyboard(&self) -> Option<Keyboard> {
        lock(&self.calls).iter().rev().find_map(|c| match c {
            TransportCall::Send { keyboard, .. } => keyboard.clone(),
            TransportCall::Edit {
                keyboard,
                result: Ok(()),
                ..
            } => keyboard.clone(),
            _ => None,
        })
    }

    fn filtered(&self, pred: impl Fn(&TransportCall) -> bool) -> Vec<TransportCall> {
        lock(&self.calls).iter().filter(|c| pred(c)).cloned().collect()
    }

    fn record(&self, call: TransportCall) {
        lock(&self.calls).push(call);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> TransportResult<MessageId> {
        let message_id = MessageId(self.next_message_id.fetch_add(1, Ordering::SeqCst));
        self.record(TransportCall::Send {
            chat_id,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
            message_id,
        });
        Ok(message_id)
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: MessageId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> TransportResult<()> {
        let result = match lock(&self.edit_failures).pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        };
        self.record(TransportCall::Edit {
            chat_id,
            message_id,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
            result: result.clone(),
        });
        result
    }

    async fn delete_message(&self, chat_id: i64, message_id: MessageId) -> TransportResult<()> {
        self.record(TransportCall::Delete {
            chat_id,
            message_id,
        });
        Ok(())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        notice: Option<&str>,
    ) -> TransportResult<()> {
        self.record(TransportCall::Answer {
            callback_id: callback_id.to_string(),
            notice: notice.map(str::to_string),
        });
        match lock(&self.answer_failures).pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn test_user(chat_id: i64) -> User {
    User {
        id: chat_id,
        username: Some("test_user".to_string()),
        first_name: Some("Test".to_string()),
        last_name: None,
    }
}

fn private_chat(chat_id: i64) -> Chat {
    Chat {
        id: chat_id,
        chat_type: "private".to_string(),
    }
}

/// Text message from the chat's own user.
pub fn text_update(update_id: u32, chat_id: i64, text: &str) -> Update {
    Update::message(
        update_id,
        Message {
            id: MessageId(1000 + update_id as i32),
            user: test_user(chat_id),
            chat: private_chat(chat_id),
            text: Some(text.to_string()),
            created_at: Utc::now(),
        },
    )
}

/// Button press on `message_id` carrying `data`; the callback id is `cb-<update_id>`.
pub fn callback_update(update_id: u32, chat_id: i64, message_id: MessageId, data: &str) -> Update {
    Update::callback(
        update_id,
        CallbackQuery {
            id: format!("cb-{}", update_id),
            from: test_user(chat_id),
            chat: Some(private_chat(chat_id)),
            message_id: Some(message_id),
            data: Some(data.to_string()),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_calls_and_scripted_edit_failure() {
        let t = RecordingTransport::new();
        let id = t.send_message(1, "hello", None).await.unwrap();
        assert_eq!(id, MessageId(1));

        t.fail_next_edit(TransportError::NotEditable);
        assert_eq!(
            t.edit_message(1, id, "again", None).await,
            Err(TransportError::NotEditable)
        );
        assert!(t.edit_message(1, id, "third", None).await.is_ok());

        t.answer_callback("cb", Some("done")).await.unwrap();

        assert_eq!(t.sends().len(), 1);
        assert_eq!(t.edits().len(), 2);
        assert_eq!(
            t.answers(),
            vec![TransportCall::Answer {
                callback_id: "cb".to_string(),
                notice: Some("done".to_string()),
            }]
        );
    }
}
