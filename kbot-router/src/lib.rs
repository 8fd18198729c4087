//! # kbot-router
//!
//! Routes each inbound update to a handler: commands by exact name, free text to a
//! catch-all, button presses by decoding their callback token through the keyboard
//! registry. Handlers receive a [`Context`] holding the chat's locked state; its
//! [`Context::send_main`] decides whether to edit the chat's main message or send a new one.

mod context;
mod dispatcher;
mod handler;

pub use context::Context;
pub use dispatcher::{
    classify, parse_command, DispatchOutcome, Dispatcher, ErrorHook, Route, STALE_NOTICE,
};
pub use handler::{button, handler_fn, Button, FnHandler, Handler, HandlerRef};
pub use kbot_keyboard::{ButtonSpec, Encoding, KeyboardLimits, Registry, DEFAULT_MAX_LIVE_SCOPES};
