//! # kbot-core
//!
//! Core types and traits for kbot: [`Transport`], [`Update`], [`Keyboard`], [`MessageTarget`],
//! errors, and tracing initialization. Transport-agnostic; used by every other kbot crate.

pub mod error;
pub mod keyboard;
pub mod logger;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;
pub mod types;

pub use error::{BuildError, KbotError, Result, TransportError, TransportResult};
pub use keyboard::{Button, ButtonAction, Keyboard, KeyboardId, NOOP_CALLBACK};
pub use logger::{init_tracing, LogSettings};
pub use transport::Transport;
pub use types::{
    CallbackQuery, Chat, Message, MessageId, MessageTarget, Update, UpdateKind, User, NO_CHANGE,
};
