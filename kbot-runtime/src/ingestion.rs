//! Update sources: long polling over a pluggable [`Poller`], a channel-fed source for custom
//! delivery, and a scripted poller for tests. The webhook source lives in `kbot-telegram`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use kbot_core::{KbotError, Result, TransportError, TransportResult, Update};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Upper bound on the final offset-confirming poll.
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);

/// One round trip of long polling.
#[async_trait]
pub trait Poller: Send + Sync {
    /// Returns updates with id >= `offset`, waiting at most `timeout` for the first one.
    /// An empty batch is a normal answer.
    async fn poll(&self, offset: u32, timeout: Duration) -> TransportResult<Vec<Update>>;
}

/// Produces the inbound update stream.
#[async_trait]
pub trait UpdateSource: Send {
    /// Pushes updates into `sink` in arrival order until `cancel` fires, the sink closes or
    /// a fatal error occurs.
    async fn run(&mut self, cancel: CancellationToken, sink: mpsc::Sender<Update>) -> Result<()>;
}

/// Active polling loop.
pub struct LongPolling<P> {
    poller: P,
    timeout: Duration,
    offset: u32,
    backoff: Duration,
}

impl<P: Poller> LongPolling<P> {
    pub fn new(poller: P, timeout: Duration) -> Self {
        Self {
            poller,
            timeout,
            offset: 0,
            backoff: Duration::from_secs(1),
        }
    }

    /// Wait after a transient poll error.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Next offset to poll from.
    pub fn offset(&self) -> u32 {
        self.offset
    }
}

#[async_trait]
impl<P: Poller> UpdateSource for LongPolling<P> {
    async fn run(&mut self, cancel: CancellationToken, sink: mpsc::Sender<Update>) -> Result<()> {
        info!(timeout_secs = self.timeout.as_secs(), "long polling started");
        'polling: loop {
            let polled = tokio::select! {
                _ = cancel.cancelled() => break,
                polled = self.poller.poll(self.offset, self.timeout) => polled,
            };

            let wait = match polled {
                Ok(batch) => {
                    if !batch.is_empty() {
                        debug!(count = batch.len(), offset = self.offset, "received updates");
                    }
                    // A received batch is forwarded whole, even when cancellation arrives meanwhile.
                    for update in batch {
                        let next = update.id.saturating_add(1);
                        if sink.send(update).await.is_err() {
                            info!("update sink closed");
                            break 'polling;
                        }
                        // Only delivered updates are confirmed by the next poll.
                        self.offset = self.offset.max(next);
                    }
                    continue;
                }
                Err(TransportError::RateLimited { retry_after }) => {
                    let wait = retry_after.unwrap_or(self.backoff);
                    warn!(retry_after_secs = wait.as_secs(), "polling rate limited");
                    wait
                }
                Err(TransportError::Network(e)) => {
                    warn!(error = %e, "poll failed, retrying");
                    self.backoff
                }
                Err(e) => {
                    error!(error = %e, "poll failed, long polling stopped");
                    return Err(KbotError::Ingestion(e.to_string()));
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }
        self.confirm().await;
        info!(offset = self.offset, "long polling stopped");
        Ok(())
    }
}

impl<P: Poller> LongPolling<P> {
    /// Tells the server everything below the current offset was received, so a restart does
    /// not see those updates again. Anything this poll returns is left unconfirmed.
    async fn confirm(&self) {
        if self.offset == 0 {
            return;
        }
        match tokio::time::timeout(CONFIRM_TIMEOUT, self.poller.poll(self.offset, Duration::ZERO)).await {
            Ok(Ok(_)) => debug!(offset = self.offset, "offset confirmed"),
            Ok(Err(e)) => warn!(offset = self.offset, error = %e, "offset confirmation failed"),
            Err(_) => warn!(offset = self.offset, "offset confirmation timed out"),
        }
    }
}

/// Source fed by the application through a channel; used for [`crate::BotMode::Custom`].
pub struct ChannelSource {
    rx: mpsc::Receiver<Update>,
}

impl ChannelSource {
    /// Returns the source and the sender the application pushes updates into.
    pub fn new(buffer: usize) -> (mpsc::Sender<Update>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self { rx })
    }
}

#[async_trait]
impl UpdateSource for ChannelSource {
    async fn run(&mut self, cancel: CancellationToken, sink: mpsc::Sender<Update>) -> Result<()> {
        loop {
            let update = tokio::select! {
                _ = cancel.cancelled() => break,
                update = self.rx.recv() => update,
            };
            match update {
                Some(update) => {
                    if sink.send(update).await.is_err() {
                        break;
                    }
                }
                None => {
                    debug!("custom update channel closed");
                    break;
                }
            }
        }
        Ok(())
    }
}

struct Script {
    batches: VecDeque<TransportResult<Vec<Update>>>,
    offsets: Vec<u32>,
}

/// Deterministic [`Poller`]: serves queued batches in order, then empty batches.
///
/// Clones share the same queue, so a test can keep one clone and push more batches
/// while the server polls the other.
#[derive(Clone)]
pub struct ScriptedPoller {
    script: Arc<Mutex<Script>>,
    idle: Duration,
}

impl ScriptedPoller {
    pub fn new(batches: Vec<Vec<Update>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                batches: batches.into_iter().map(Ok).collect(),
                offsets: Vec::new(),
            })),
            idle: Duration::from_millis(20),
        }
    }

    /// Queues another batch.
    pub fn push(&self, batch: Vec<Update>) {
        self.script().batches.push_back(Ok(batch));
    }

    /// Queues a failed poll.
    pub fn push_error(&self, err: TransportError) {
        self.script().batches.push_back(Err(err));
    }

    /// Offsets of every poll so far.
    pub fn offsets(&self) -> Vec<u32> {
        self.script().offsets.clone()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Poller for ScriptedPoller {
    async fn poll(&self, offset: u32, timeout: Duration) -> TransportResult<Vec<Update>> {
        let next = {
            let mut script = self.script();
            script.offsets.push(offset);
            script.batches.pop_front()
        };
        match next {
            Some(batch) => batch,
            None => {
                // Behave like an idle long poll without making tests wait the full timeout.
                tokio::time::sleep(timeout.min(self.idle)).await;
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbot_core::testing::text_update;

    #[tokio::test]
    async fn test_long_polling_forwards_and_advances_offset() {
        let poller = ScriptedPoller::new(vec![
            vec![],
            vec![text_update(5, 1, "a"), text_update(6, 1, "b")],
            vec![],
            vec![text_update(9, 2, "c")],
        ]);
        let mut source = LongPolling::new(poller.clone(), Duration::from_secs(10));
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                source.run(cancel, tx).await.unwrap();
                source.offset()
            })
        };

        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(rx.recv().await.unwrap().id);
        }
        cancel.cancel();
        let offset = task.await.unwrap();

        assert_eq!(ids, vec![5, 6, 9]);
        assert_eq!(offset, 10);
        let offsets = poller.offsets();
        assert_eq!(&offsets[..4], &[0, 0, 7, 7]);
        // The stop confirms the last offset with one more poll.
        assert_eq!(offsets.last(), Some(&10));
    }

    #[tokio::test]
    async fn test_nothing_to_confirm_without_updates() {
        let poller = ScriptedPoller::new(vec![]);
        let mut source = LongPolling::new(poller.clone(), Duration::from_secs(10));
        let (tx, _rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(source.run(cancel, tx).await.is_ok());
        assert!(poller.offsets().iter().all(|o| *o == 0));
    }

    #[tokio::test]
    async fn test_undelivered_update_is_not_confirmed() {
        let poller = ScriptedPoller::new(vec![vec![text_update(3, 1, "a"), text_update(4, 1, "b")]]);
        let mut source = LongPolling::new(poller.clone(), Duration::from_secs(10));
        let (tx, rx) = mpsc::channel(4);
        drop(rx);

        assert!(source.run(CancellationToken::new(), tx).await.is_ok());
        assert_eq!(source.offset(), 0);
        assert_eq!(poller.offsets(), vec![0]);
    }

    #[tokio::test]
    async fn test_transient_error_is_retried() {
        let poller = ScriptedPoller::new(vec![]);
        poller.push_error(TransportError::Network("reset".to_string()));
        poller.push(vec![text_update(1, 1, "after error")]);
        let mut source =
            LongPolling::new(poller, Duration::from_secs(1)).with_backoff(Duration::from_millis(1));
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let c = cancel.clone();
        let task = tokio::spawn(async move { source.run(c, tx).await });

        assert_eq!(rx.recv().await.map(|u| u.id), Some(1));
        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_api_error_is_fatal() {
        let poller = ScriptedPoller::new(vec![]);
        poller.push_error(TransportError::Api("Unauthorized".to_string()));
        let mut source = LongPolling::new(poller, Duration::from_secs(1));
        let (tx, _rx) = mpsc::channel(4);

        let result = source.run(CancellationToken::new(), tx).await;
        assert!(matches!(result, Err(KbotError::Ingestion(_))));
    }

    #[tokio::test]
    async fn test_channel_source_stops_when_cancelled() {
        let (input, mut source) = ChannelSource::new(4);
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let c = cancel.clone();
        let task = tokio::spawn(async move { source.run(c, tx).await });

        input.send(text_update(3, 1, "x")).await.unwrap();
        assert_eq!(rx.recv().await.map(|u| u.id), Some(3));
        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
    }
}
