//! Wraps teloxide::Bot and implements [`kbot_core::Transport`].

use async_trait::async_trait;
use kbot_core::{Keyboard, MessageId, Transport, TransportError, TransportResult};
use teloxide::prelude::*;
use teloxide::types::{CallbackQueryId, ChatId};
use teloxide::{ApiError, RequestError};
use tracing::debug;

use crate::adapters::to_markup;

/// Maps a teloxide request failure onto the transport error the framework reacts to.
pub fn map_request_error(e: RequestError) -> TransportError {
    match e {
        RequestError::Api(ApiError::MessageNotModified) => TransportError::NotModified,
        RequestError::Api(ApiError::MessageToEditNotFound | ApiError::MessageCantBeEdited) => {
            TransportError::NotEditable
        }
        RequestError::Api(
            ApiError::BotBlocked | ApiError::BotKicked | ApiError::UserDeactivated,
        ) => TransportError::ChatBlocked,
        RequestError::RetryAfter(after) => TransportError::RateLimited {
            retry_after: Some(after.duration()),
        },
        RequestError::Network(e) => TransportError::Network(e.to_string()),
        RequestError::Io(e) => TransportError::Network(e.to_string()),
        other => TransportError::Api(other.to_string()),
    }
}

/// Thin wrapper around teloxide::Bot that implements kbot-core's Transport trait.
#[derive(Clone)]
pub struct TelegramTransport {
    bot: teloxide::Bot,
}

impl TelegramTransport {
    pub fn new(bot: teloxide::Bot) -> Self {
        Self { bot }
    }

    /// Returns the underlying teloxide::Bot for direct API use when needed.
    pub fn inner(&self) -> &teloxide::Bot {
        &self.bot
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> TransportResult<MessageId> {
        let mut request = self.bot.send_message(ChatId(chat_id), text.to_string());
        if let Some(kb) = keyboard {
            request = request.reply_markup(to_markup(kb));
        }
        let sent = request.await.map_err(map_request_error)?;
        debug!(chat_id = chat_id, message_id = sent.id.0, "message sent");
        Ok(MessageId(sent.id.0))
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: MessageId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> TransportResult<()> {
        let mut request = self.bot.edit_message_text(
            ChatId(chat_id),
            teloxide::types::MessageId(message_id.0),
            text.to_string(),
        );
        if let Some(kb) = keyboard {
            request = request.reply_markup(to_markup(kb));
        }
        request.await.map_err(map_request_error)?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: MessageId) -> TransportResult<()> {
        self.bot
            .delete_message(ChatId(chat_id), teloxide::types::MessageId(message_id.0))
            .await
            .map_err(map_request_error)?;
        Ok(())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        notice: Option<&str>,
    ) -> TransportResult<()> {
        let mut request = self
            .bot
            .answer_callback_query(CallbackQueryId(callback_id.to_string()));
        if let Some(text) = notice {
            request = request.text(text.to_string());
        }
        request.await.map_err(map_request_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_request_error() {
        assert_eq!(
            map_request_error(RequestError::Api(ApiError::MessageNotModified)),
            TransportError::NotModified
        );
        assert_eq!(
            map_request_error(RequestError::Api(ApiError::MessageToEditNotFound)),
            TransportError::NotEditable
        );
        assert_eq!(
            map_request_error(RequestError::Api(ApiError::MessageCantBeEdited)),
            TransportError::NotEditable
        );
        assert_eq!(
            map_request_error(RequestError::Api(ApiError::BotBlocked)),
            TransportError::ChatBlocked
        );
        assert!(matches!(
            map_request_error(RequestError::Api(ApiError::Unknown("odd".to_string()))),
            TransportError::Api(_)
        ));
    }
}
