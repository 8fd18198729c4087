//! # kbot-runtime
//!
//! Configuration ([`BotConfig`]), update sources ([`LongPolling`], [`ChannelSource`],
//! [`ScriptedPoller`]) and the [`Server`] that ties a source to a dispatcher and manages
//! start and graceful stop.

pub mod config;
pub mod ingestion;
pub mod server;

pub use config::{BotConfig, BotMode, LongPollingConfig, WebhookConfig};
pub use ingestion::{ChannelSource, LongPolling, Poller, ScriptedPoller, UpdateSource};
pub use server::{Completion, Handshake, Server, ShutdownReport};
