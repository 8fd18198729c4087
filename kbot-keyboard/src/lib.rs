//! # kbot-keyboard
//!
//! Callback-token [`Registry`] and [`KeyboardBuilder`]. Generic over the handler type so the
//! router can plug in its own `dyn Handler` without this crate knowing about contexts.

pub mod builder;
pub mod registry;
pub mod token;

pub use builder::{ButtonSpec, KeyboardBuilder, KeyboardLimits};
pub use registry::{Encoding, Registry, Resolved, DEFAULT_MAX_LIVE_SCOPES};

// Integration tests live in tests/keyboard_builder_test.rs
