//! Per-event context handed to handlers: the update, the chat's locked state, keyboard
//! building and the edit-or-send decision for the chat's main message.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kbot_core::{
    CallbackQuery, Keyboard, KbotError, MessageId, MessageTarget, Result, Transport,
    TransportError, Update, UpdateKind, User,
};
use kbot_keyboard::{Encoding, KeyboardBuilder};
use kbot_state::{ChatGuard, ChatState};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::dispatcher::parse_command;
use crate::handler::{Button, Handler};

/// Everything a handler may touch while it runs. Created per event, consumed by the handler.
pub struct Context {
    update: Arc<Update>,
    chat: ChatGuard,
    transport: Arc<dyn Transport>,
    keyboards: KeyboardBuilder<dyn Handler>,
    cancel: CancellationToken,
    answered: Arc<AtomicBool>,
    delete_messages: bool,
}

impl Context {
    pub(crate) fn new(
        update: Arc<Update>,
        chat: ChatGuard,
        transport: Arc<dyn Transport>,
        keyboards: KeyboardBuilder<dyn Handler>,
        cancel: CancellationToken,
        answered: Arc<AtomicBool>,
        delete_messages: bool,
    ) -> Self {
        Self {
            update,
            chat,
            transport,
            keyboards,
            cancel,
            answered,
            delete_messages,
        }
    }

    pub fn update(&self) -> &Update {
        &self.update
    }

    pub fn chat_id(&self) -> i64 {
        self.chat.chat_id
    }

    /// The chat's state as of now (exclusively held by this context).
    pub fn state(&self) -> &ChatState {
        &self.chat
    }

    pub fn main_message(&self) -> Option<MessageId> {
        self.chat.main_message
    }

    pub fn user(&self) -> Option<&User> {
        self.update.user()
    }

    /// Text of the inbound message; `None` for button presses.
    pub fn text(&self) -> Option<&str> {
        match &self.update.kind {
            UpdateKind::Message(m) => m.text.as_deref(),
            _ => None,
        }
    }

    pub fn callback(&self) -> Option<&CallbackQuery> {
        match &self.update.kind {
            UpdateKind::CallbackQuery(q) => Some(q),
            _ => None,
        }
    }

    /// Arguments after the command word, trimmed; `None` when the message is not a command.
    pub fn command_args(&self) -> Option<&str> {
        self.text().and_then(parse_command).map(|(_, args)| args)
    }

    /// Cancelled when the server is shutting down; long handlers should watch it.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Builds a keyboard for this chat. Tokens stay valid while the keyboard is the chat's
    /// main keyboard (dense) or for the whole process (global).
    pub fn keyboard(
        &self,
        columns: usize,
        encoding: Encoding,
        buttons: Vec<Button>,
    ) -> Result<Keyboard> {
        Ok(self
            .keyboards
            .build(self.chat_id(), columns, encoding, buttons)?)
    }

    /// Puts `text` and `keyboard` into the chat's main message and returns its id.
    ///
    /// `NoChange` edits the current main message or sends one if there is none; `New`
    /// always sends; `Existing(id)` edits `id`. An edit the transport refuses as
    /// not editable falls back to a fresh send. The sent or edited message becomes the
    /// chat's main message.
    #[instrument(skip(self, text, keyboard), fields(chat_id = self.chat.chat_id))]
    pub async fn send_main(
        &mut self,
        target: MessageTarget,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<MessageId> {
        let chat_id = self.chat.chat_id;
        let scope = keyboard.as_ref().and_then(Keyboard::scope);
        let edit_target = match target {
            MessageTarget::NoChange => self.chat.main_message,
            MessageTarget::New => None,
            MessageTarget::Existing(id) => Some(id),
        };

        let sent = match edit_target {
            Some(message_id) => {
                match self
                    .transport
                    .edit_message(chat_id, message_id, text, keyboard.as_ref())
                    .await
                {
                    Ok(()) => Ok(message_id),
                    Err(TransportError::NotModified) => {
                        debug!(message_id = %message_id, "main message already up to date");
                        Ok(message_id)
                    }
                    Err(TransportError::NotEditable) => {
                        warn!(
                            message_id = %message_id,
                            "main message is not editable, sending a new one"
                        );
                        self.transport
                            .send_message(chat_id, text, keyboard.as_ref())
                            .await
                    }
                    Err(e) => Err(e),
                }
            }
            None => {
                self.transport
                    .send_message(chat_id, text, keyboard.as_ref())
                    .await
            }
        };

        let message_id = match sent {
            Ok(id) => id,
            Err(e) => {
                // The keyboard was never shown; its tokens must not stay live.
                if let Some(scope) = scope {
                    self.keyboards.registry().release(scope);
                }
                return Err(KbotError::Transport(e));
            }
        };

        let previous = self.chat.main_message;
        if let Some(superseded) = self.chat.set_main(message_id, scope) {
            self.keyboards.registry().release(superseded);
            debug!(scope = ?superseded, "released superseded keyboard");
        }

        if self.delete_messages {
            if let Some(old) = previous.filter(|old| *old != message_id) {
                if let Err(e) = self.transport.delete_message(chat_id, old).await {
                    warn!(message_id = %old, error = %e, "failed to delete superseded main message");
                }
            }
        }

        debug!(message_id = %message_id, edited = edit_target == Some(message_id), "main message set");
        Ok(message_id)
    }

    /// Sends a message outside the main-message slot.
    pub async fn send(&self, text: &str, keyboard: Option<&Keyboard>) -> Result<MessageId> {
        Ok(self
            .transport
            .send_message(self.chat_id(), text, keyboard)
            .await?)
    }

    /// Acknowledges the button press with an optional notice. Once this succeeds the
    /// dispatcher skips its own acknowledgment; a failed answer leaves that to the dispatcher.
    /// No-op for non-callback events or when already answered.
    pub async fn answer(&self, notice: Option<&str>) -> Result<()> {
        let Some(query) = self.callback() else {
            return Ok(());
        };
        if self.answered.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.transport.answer_callback(&query.id, notice).await?;
        self.answered.store(true, Ordering::SeqCst);
        Ok(())
    }
}
