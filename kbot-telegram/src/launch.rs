//! Wires a [`BotConfig`] to teloxide: client, handshake, update source, server.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kbot_core::{KbotError, Result, Transport};
use kbot_router::{Dispatcher, HandlerRef};
use kbot_runtime::{BotConfig, BotMode, Completion, Handshake, LongPolling, Server, UpdateSource};
use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::poller::TelegramPoller;
use crate::transport::TelegramTransport;
use crate::webhook::Webhook;

/// Builds the teloxide client. The HTTP timeout leaves room for a full long poll.
pub fn build_bot(config: &BotConfig) -> Result<teloxide::Bot> {
    let token = config.token()?;
    let client = teloxide::net::default_reqwest_settings()
        .timeout(config.long_polling.timeout + Duration::from_secs(10))
        .build()
        .map_err(|e| KbotError::Config(format!("failed to build HTTP client: {}", e)))?;
    let bot = teloxide::Bot::with_client(token, client);
    Ok(match &config.telegram_api_url {
        Some(url_str) => match reqwest::Url::parse(url_str) {
            Ok(url) => bot.set_api_url(url),
            Err(e) => {
                error!(error = %e, url = %url_str, "Invalid TELEGRAM_API_URL, using default");
                bot
            }
        },
        None => bot,
    })
}

/// Checks the token with `getMe`; in polling mode also drops any registered webhook,
/// which would otherwise make `getUpdates` fail.
pub struct TelegramHandshake {
    bot: teloxide::Bot,
    mode: BotMode,
}

impl TelegramHandshake {
    pub fn new(bot: teloxide::Bot, mode: BotMode) -> Self {
        Self { bot, mode }
    }
}

#[async_trait]
impl Handshake for TelegramHandshake {
    async fn handshake(&self) -> Result<()> {
        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| KbotError::Config(format!("getMe failed, check BOT_TOKEN: {}", e)))?;
        info!(username = ?me.username, "connected to Telegram");
        if self.mode == BotMode::Polling {
            self.bot
                .delete_webhook()
                .await
                .map_err(|e| KbotError::Ingestion(format!("deleteWebhook failed: {}", e)))?;
        }
        Ok(())
    }
}

/// Starts a Telegram bot: `routes` adds commands and text handlers to the configured
/// dispatcher, `start_handler` answers `/start`.
///
/// Polling and webhook modes are supported here; custom mode needs an application
/// source, so build a [`Server`] directly.
#[instrument(skip_all, fields(mode = ?config.mode))]
pub async fn launch<R, S>(
    config: BotConfig,
    routes: R,
    start_handler: HandlerRef,
    cancel: CancellationToken,
    stop_signal: S,
) -> Result<Completion>
where
    R: FnOnce(Dispatcher) -> Dispatcher,
    S: Future<Output = ()> + Send + 'static,
{
    config.validate()?;
    let bot = build_bot(&config)?;
    let transport: Arc<dyn Transport> = Arc::new(TelegramTransport::new(bot.clone()));
    let dispatcher = routes(config.dispatcher(transport));

    let source: Box<dyn UpdateSource> = match config.mode {
        BotMode::Polling => Box::new(LongPolling::new(
            TelegramPoller::new(bot.clone()),
            config.long_polling.timeout,
        )),
        BotMode::Webhook => {
            let registering = (!config.offline).then(|| bot.clone());
            let webhook = Webhook::bind(config.webhook.clone(), registering)
                .await
                .map_err(|e| {
                    KbotError::Config(format!("cannot listen on {}: {}", config.webhook.listen, e))
                })?
                .with_shutdown_grace(config.shutdown_grace);
            Box::new(webhook)
        }
        BotMode::Custom => {
            return Err(KbotError::Config(
                "custom mode needs an application update source; use Server::new".to_string(),
            ))
        }
    };

    let handshake = Arc::new(TelegramHandshake::new(bot, config.mode));
    Server::new(config, dispatcher, source)
        .with_handshake(handshake)
        .start(cancel, start_handler, stop_signal)
        .await
}
