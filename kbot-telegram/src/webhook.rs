//! Webhook update source: an axum endpoint the Bot API posts updates to.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use kbot_core::{KbotError, Result, Update};
use kbot_runtime::{UpdateSource, WebhookConfig};
use teloxide::prelude::*;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::TelegramUpdateWrapper;

/// Header carrying the secret registered with `setWebhook`.
pub const SECRET_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

/// How long open requests may finish after cancellation unless overridden.
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Clone)]
struct WebhookState {
    // Weak so connections outliving `run` cannot keep the update stream open.
    sink: mpsc::WeakSender<Update>,
    secret: Option<Arc<str>>,
}

/// Receives updates over HTTP. The listener is bound in [`Webhook::bind`] so the address is
/// known (and port conflicts surface) before the server starts.
pub struct Webhook {
    config: WebhookConfig,
    bot: Option<teloxide::Bot>,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    shutdown_grace: Duration,
}

impl Webhook {
    /// Binds `config.listen`. With `bot` set, [`UpdateSource::run`] also registers
    /// `config.url` with the Bot API; pass `None` offline.
    pub async fn bind(config: WebhookConfig, bot: Option<teloxide::Bot>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.listen).await?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            config,
            bot,
            listener: Some(listener),
            local_addr,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        })
    }

    /// Time open requests get to finish once cancelled; connections still open after it
    /// are dropped.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn route_path(&self) -> String {
        if self.config.path.starts_with('/') {
            self.config.path.clone()
        } else {
            format!("/{}", self.config.path)
        }
    }

    async fn register(&self) -> Result<()> {
        let (Some(bot), Some(url)) = (&self.bot, &self.config.url) else {
            debug!("no bot or url, skipping webhook registration");
            return Ok(());
        };
        let url: reqwest::Url = url
            .parse()
            .map_err(|e| KbotError::Config(format!("invalid WEBHOOK_URL {:?}: {}", url, e)))?;
        let mut request = bot.set_webhook(url.clone());
        if let Some(secret) = &self.config.secret {
            request = request.secret_token(secret.clone());
        }
        request
            .await
            .map_err(|e| KbotError::Ingestion(format!("setWebhook failed: {}", e)))?;
        info!(url = %url, "webhook registered");
        Ok(())
    }
}

#[async_trait]
impl UpdateSource for Webhook {
    async fn run(&mut self, cancel: CancellationToken, sink: mpsc::Sender<Update>) -> Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| KbotError::Ingestion("webhook already running".to_string()))?;
        self.register().await?;

        let state = WebhookState {
            sink: sink.downgrade(),
            secret: self.config.secret.as_deref().map(Arc::from),
        };
        let path = self.route_path();
        let app = Router::new()
            .route(&path, post(receive))
            .with_state(state);

        info!(addr = %self.local_addr, path = %path, "webhook listening");
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(cancel.clone().cancelled_owned())
            .into_future();
        let grace = self.shutdown_grace;
        tokio::select! {
            served = server => {
                served.map_err(|e| KbotError::Ingestion(format!("webhook server failed: {}", e)))?;
                info!("webhook stopped");
            }
            _ = async {
                cancel.cancelled().await;
                tokio::time::sleep(grace).await;
            } => {
                warn!(
                    grace_secs = grace.as_secs_f32(),
                    "webhook requests still open after grace period, closing"
                );
            }
        }
        Ok(())
    }
}

async fn receive(State(state): State<WebhookState>, headers: HeaderMap, body: Bytes) -> StatusCode {
    if let Some(secret) = &state.secret {
        let given = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if given != Some(secret.as_ref()) {
            warn!("webhook request with wrong secret token rejected");
            return StatusCode::UNAUTHORIZED;
        }
    }

    // Malformed bodies are acknowledged so the Bot API does not redeliver them forever.
    let raw: teloxide::types::Update = match serde_json::from_slice(&body) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "malformed webhook update dropped");
            return StatusCode::OK;
        }
    };
    let update = TelegramUpdateWrapper(&raw).to_core();
    debug!(update_id = update.id, "webhook update received");
    let Some(sink) = state.sink.upgrade() else {
        return StatusCode::SERVICE_UNAVAILABLE;
    };
    match sink.send(update).await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
