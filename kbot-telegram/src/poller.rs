//! `getUpdates` round trips for [`kbot_runtime::LongPolling`].

use std::time::Duration;

use async_trait::async_trait;
use kbot_core::{TransportResult, Update};
use kbot_runtime::Poller;
use teloxide::prelude::*;
use teloxide::types::AllowedUpdate;

use crate::adapters::TelegramUpdateWrapper;
use crate::transport::map_request_error;

/// Long-polls the Bot API for messages and button presses.
#[derive(Clone)]
pub struct TelegramPoller {
    bot: teloxide::Bot,
}

impl TelegramPoller {
    pub fn new(bot: teloxide::Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Poller for TelegramPoller {
    async fn poll(&self, offset: u32, timeout: Duration) -> TransportResult<Vec<Update>> {
        let updates = self
            .bot
            .get_updates()
            .offset(offset as i32)
            .timeout(timeout.as_secs() as u32)
            .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery])
            .await
            .map_err(map_request_error)?;
        Ok(updates
            .iter()
            .map(|u| TelegramUpdateWrapper(u).to_core())
            .collect())
    }
}
