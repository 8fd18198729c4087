//! Tracing initialization: fmt layer on stdout, plus the same format appended to a log file when one is configured.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry,
};

/// Diagnostic toggles shared by the runtime config and the tracing setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Install a subscriber at all.
    pub enable: bool,
    /// Default filter becomes `debug` instead of `info`.
    pub debug: bool,
    /// Log every inbound update at info level.
    pub log_updates: bool,
    /// Optional log file (append mode).
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            enable: true,
            debug: false,
            log_updates: false,
            file: None,
        }
    }
}

impl LogSettings {
    /// Filter used when `RUST_LOG` is not set.
    pub fn default_directive(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}

/// Installs the global tracing subscriber.
/// Level comes from `RUST_LOG`; without it, `info` (or `debug` when `settings.debug`).
/// Does nothing when `settings.enable` is false.
pub fn init_tracing(settings: &LogSettings) -> anyhow::Result<()> {
    if !settings.enable {
        return Ok(());
    }

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.default_directive()));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    let file_layer = match &settings.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true),
            )
        }
        None => None,
    };

    Registry::default()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set global subscriber: {}", e))?;

    Ok(())
}
