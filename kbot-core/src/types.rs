//! Core types: user, chat, message ids and targets, inbound updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// User identity (id, username, names).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl User {
    /// Placeholder for updates that carry no sender (channel posts, anonymous admins).
    pub fn anonymous() -> Self {
        Self {
            id: 0,
            username: None,
            first_name: None,
            last_name: None,
        }
    }
}

/// Chat (channel or private) identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    pub chat_type: String,
}

/// Transport-assigned identity of a message inside one chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub i32);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which message a `send_main` call should land in.
///
/// `NoChange` is its own variant rather than a reserved id, so it can never be
/// mistaken for a real message or for "no main message yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTarget {
    /// Edit the chat's current main message, or send one if there is none.
    NoChange,
    /// Always send a fresh message and make it the main message.
    New,
    /// Edit this specific message and make it the main message.
    Existing(MessageId),
}

/// Shorthand for [`MessageTarget::NoChange`].
pub const NO_CHANGE: MessageTarget = MessageTarget::NoChange;

impl From<MessageId> for MessageTarget {
    fn from(id: MessageId) -> Self {
        MessageTarget::Existing(id)
    }
}

/// An inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub user: User,
    pub chat: Chat,
    pub text: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A button press on an inline keyboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackQuery {
    /// Transport id used to acknowledge the press.
    pub id: String,
    pub from: User,
    /// Chat of the message the keyboard was attached to; `None` for inline-mode messages.
    pub chat: Option<Chat>,
    /// Message the keyboard was attached to.
    pub message_id: Option<MessageId>,
    /// Callback payload of the pressed button.
    pub data: Option<String>,
}

/// Payload of an [`Update`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UpdateKind {
    Message(Message),
    CallbackQuery(CallbackQuery),
    /// Anything the framework does not route; the string names the kind for logs.
    Other(String),
}

/// One inbound event as delivered by the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub id: u32,
    pub kind: UpdateKind,
}

impl Update {
    pub fn message(id: u32, message: Message) -> Self {
        Self {
            id,
            kind: UpdateKind::Message(message),
        }
    }

    pub fn callback(id: u32, query: CallbackQuery) -> Self {
        Self {
            id,
            kind: UpdateKind::CallbackQuery(query),
        }
    }

    /// Chat this update belongs to, if any.
    pub fn chat_id(&self) -> Option<i64> {
        match &self.kind {
            UpdateKind::Message(m) => Some(m.chat.id),
            UpdateKind::CallbackQuery(q) => q.chat.as_ref().map(|c| c.id),
            UpdateKind::Other(_) => None,
        }
    }

    /// Sender of this update, if any.
    pub fn user(&self) -> Option<&User> {
        match &self.kind {
            UpdateKind::Message(m) => Some(&m.user),
            UpdateKind::CallbackQuery(q) => Some(&q.from),
            UpdateKind::Other(_) => None,
        }
    }

    /// Short kind label for logs.
    pub fn kind_name(&self) -> &str {
        match &self.kind {
            UpdateKind::Message(_) => "message",
            UpdateKind::CallbackQuery(_) => "callback_query",
            UpdateKind::Other(kind) => kind.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn private_chat(id: i64) -> Chat {
        Chat {
            id,
            chat_type: "private".to_string(),
        }
    }

    #[test]
    fn test_no_change_is_distinct_from_every_existing_id() {
        assert_ne!(NO_CHANGE, MessageTarget::Existing(MessageId(0)));
        assert_ne!(NO_CHANGE, MessageTarget::Existing(MessageId(-1)));
        assert_ne!(NO_CHANGE, MessageTarget::New);
        assert_eq!(MessageTarget::from(MessageId(7)), MessageTarget::Existing(MessageId(7)));
    }

    #[test]
    fn test_update_chat_id() {
        let msg = Update::message(
            1,
            Message {
                id: MessageId(10),
                user: User::anonymous(),
                chat: private_chat(42),
                text: Some("hi".to_string()),
                created_at: Utc::now(),
            },
        );
        assert_eq!(msg.chat_id(), Some(42));
        assert_eq!(msg.kind_name(), "message");

        let inline = Update::callback(
            2,
            CallbackQuery {
                id: "cb".to_string(),
                from: User::anonymous(),
                chat: None,
                message_id: None,
                data: Some("d1.0".to_string()),
            },
        );
        assert_eq!(inline.chat_id(), None);

        let other = Update {
            id: 3,
            kind: UpdateKind::Other("poll".to_string()),
        };
        assert_eq!(other.chat_id(), None);
        assert_eq!(other.kind_name(), "poll");
    }
}
