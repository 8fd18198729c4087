//! Transport abstraction for sending, editing and deleting messages and answering callbacks.
//!
//! [`Transport`] is transport-agnostic; `kbot-telegram` implements it via teloxide.

use crate::error::TransportResult;
use crate::keyboard::Keyboard;
use crate::types::MessageId;
use async_trait::async_trait;

/// Outbound side of the chat transport. Retries on network failure are the
/// implementation's concern; callers only see the final outcome.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a message (with an optional inline keyboard) and returns its id.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> TransportResult<MessageId>;

    /// Replaces text and keyboard of an already sent message.
    /// Fails with [`crate::TransportError::NotEditable`] when the message is gone or too old.
    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: MessageId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> TransportResult<()>;

    async fn delete_message(&self, chat_id: i64, message_id: MessageId) -> TransportResult<()>;

    /// Acknowledges a button press, clearing the client's loading indicator.
    async fn answer_callback(&self, callback_id: &str, notice: Option<&str>)
        -> TransportResult<()>;
}
