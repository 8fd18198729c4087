//! Runtime configuration, loaded from environment variables.
//!
//! `BOT_TOKEN` is required unless `BOT_OFFLINE` is set; every other variable has a default.
//! Binaries call `dotenvy::dotenv()` first so a `.env` file works too.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use kbot_core::{KbotError, LogSettings, Transport};
use kbot_router::{Dispatcher, KeyboardLimits, Registry, DEFAULT_MAX_LIVE_SCOPES};

/// How updates reach the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotMode {
    Polling,
    Webhook,
    /// The application supplies its own update source.
    Custom,
}

impl FromStr for BotMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "polling" | "poll" => Ok(BotMode::Polling),
            "webhook" => Ok(BotMode::Webhook),
            "custom" => Ok(BotMode::Custom),
            other => anyhow::bail!("unknown bot mode {:?} (expected polling, webhook or custom)", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongPollingConfig {
    /// Longest a single poll waits for updates.
    pub timeout: Duration,
}

impl Default for LongPollingConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    /// Public URL registered with the transport; required in webhook mode unless offline.
    pub url: Option<String>,
    pub listen: SocketAddr,
    pub path: String,
    /// Expected value of the secret-token header; `None` accepts every request.
    pub secret: Option<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            listen: SocketAddr::from(([0, 0, 0, 0], 8443)),
            path: "/webhook".to_string(),
            secret: None,
        }
    }
}

/// Full runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    pub token: Option<String>,
    pub mode: BotMode,
    pub long_polling: LongPollingConfig,
    pub log: LogSettings,
    /// Delete a main message once a different one replaces it.
    pub delete_messages: bool,
    /// Skip every call that needs a live transport (handshake, webhook registration).
    pub offline: bool,
    pub webhook: WebhookConfig,
    pub shutdown_grace: Duration,
    pub keyboard: KeyboardLimits,
    pub max_live_keyboards: usize,
    pub telegram_api_url: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: None,
            mode: BotMode::Polling,
            long_polling: LongPollingConfig::default(),
            log: LogSettings::default(),
            delete_messages: false,
            offline: false,
            webhook: WebhookConfig::default(),
            shutdown_grace: Duration::from_secs(5),
            keyboard: KeyboardLimits::default(),
            max_live_keyboards: DEFAULT_MAX_LIVE_SCOPES,
            telegram_api_url: None,
        }
    }
}

impl BotConfig {
    /// Loads from environment variables; unset ones take their defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let log = LogSettings {
            enable: env_parse("LOG_ENABLE", defaults.log.enable)?,
            debug: env_parse("BOT_DEBUG", defaults.log.debug)?,
            log_updates: env_parse("LOG_UPDATES", defaults.log.log_updates)?,
            file: env_opt("LOG_FILE").map(PathBuf::from),
        };
        let webhook = WebhookConfig {
            url: env_opt("WEBHOOK_URL"),
            listen: env_parse("WEBHOOK_LISTEN", defaults.webhook.listen)?,
            path: env_opt("WEBHOOK_PATH").unwrap_or(defaults.webhook.path),
            secret: env_opt("WEBHOOK_SECRET"),
        };
        let keyboard = KeyboardLimits {
            max_columns: env_parse("KEYBOARD_MAX_COLUMNS", defaults.keyboard.max_columns)?,
            ..defaults.keyboard
        };

        Ok(Self {
            token: env_opt("BOT_TOKEN"),
            mode: env_parse("BOT_MODE", defaults.mode)?,
            long_polling: LongPollingConfig {
                timeout: Duration::from_secs(env_parse(
                    "LONG_POLLING_TIMEOUT_SECS",
                    defaults.long_polling.timeout.as_secs(),
                )?),
            },
            log,
            delete_messages: env_parse("BOT_DELETE_MESSAGES", defaults.delete_messages)?,
            offline: env_parse("BOT_OFFLINE", defaults.offline)?,
            webhook,
            shutdown_grace: Duration::from_secs(env_parse(
                "SHUTDOWN_GRACE_SECS",
                defaults.shutdown_grace.as_secs(),
            )?),
            keyboard,
            max_live_keyboards: env_parse("KEYBOARD_MAX_LIVE", defaults.max_live_keyboards)?,
            telegram_api_url: env_opt("TELEGRAM_API_URL").or_else(|| env_opt("TELOXIDE_API_URL")),
        })
    }

    /// Configuration for running without a transport: no token, no handshake.
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    /// Defaults with the given token.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::default()
        }
    }

    /// Checks settings that can only fail at startup.
    pub fn validate(&self) -> kbot_core::Result<()> {
        if !self.offline && self.token.as_deref().map_or(true, |t| t.trim().is_empty()) {
            return Err(KbotError::Config(
                "BOT_TOKEN is required unless running offline".to_string(),
            ));
        }
        if !self.offline && self.mode == BotMode::Webhook && self.webhook.url.is_none() {
            return Err(KbotError::Config(
                "WEBHOOK_URL is required in webhook mode".to_string(),
            ));
        }
        if self.keyboard.max_columns == 0 {
            return Err(KbotError::Config(
                "KEYBOARD_MAX_COLUMNS must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Dispatcher over `transport` with this configuration's keyboard limits, live-keyboard
    /// cap and message options. Routes are added by the caller.
    pub fn dispatcher(&self, transport: Arc<dyn Transport>) -> Dispatcher {
        Dispatcher::new(transport)
            .with_keyboards(Arc::new(Registry::new(self.max_live_keyboards)), self.keyboard)
            .delete_messages(self.delete_messages)
            .log_updates(self.log.log_updates)
    }

    /// The token, or a config error when it is missing.
    pub fn token(&self) -> kbot_core::Result<&str> {
        self.token
            .as_deref()
            .ok_or_else(|| KbotError::Config("BOT_TOKEN not set".to_string()))
    }
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("invalid value for {}: {:?}", name, raw)),
    }
}
