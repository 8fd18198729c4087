//! # kbot-telegram
//!
//! Telegram binding for kbot: teloxide-backed [`TelegramTransport`], a `getUpdates`
//! [`TelegramPoller`], the axum [`Webhook`] source, and [`launch`] which wires a
//! [`kbot_runtime::BotConfig`] into a running server.

mod adapters;
mod launch;
mod poller;
mod transport;
mod webhook;

pub use adapters::{
    to_markup, TelegramChatWrapper, TelegramMessageWrapper, TelegramUpdateWrapper,
    TelegramUserWrapper,
};
pub use launch::{build_bot, launch, TelegramHandshake};
pub use poller::TelegramPoller;
pub use transport::{map_request_error, TelegramTransport};
pub use webhook::{Webhook, SECRET_HEADER};
