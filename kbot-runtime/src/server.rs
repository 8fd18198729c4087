//! Lifecycle manager: runs one update source and a dispatch loop, shuts both down on
//! cancellation with a grace period for in-flight handlers.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kbot_core::{KbotError, Result, Update};
use kbot_router::{DispatchOutcome, Dispatcher, HandlerRef};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::BotConfig;
use crate::ingestion::UpdateSource;

/// Updates buffered between the source and the dispatch loop.
const UPDATE_BUFFER: usize = 256;

/// Transport check run once before ingestion starts (skipped offline).
#[async_trait]
pub trait Handshake: Send + Sync {
    async fn handshake(&self) -> Result<()>;
}

/// What happened during a server run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Updates whose dispatch ran to completion.
    pub dispatched: usize,
    /// Dispatch tasks aborted after the grace period.
    pub aborted: usize,
    /// Dispatch tasks that panicked.
    pub panicked: usize,
}

/// Resolves once the server has fully stopped.
pub struct Completion {
    rx: oneshot::Receiver<Result<ShutdownReport>>,
}

impl Completion {
    /// Waits for shutdown. Fails when the update source stopped on a fatal error.
    pub async fn wait(self) -> Result<ShutdownReport> {
        self.rx.await.unwrap_or_else(|_| {
            Err(KbotError::Ingestion(
                "dispatch loop ended without reporting".to_string(),
            ))
        })
    }
}

/// Bot server: a dispatcher plus the update source feeding it.
pub struct Server {
    config: BotConfig,
    dispatcher: Dispatcher,
    source: Box<dyn UpdateSource>,
    handshake: Option<Arc<dyn Handshake>>,
}

impl Server {
    pub fn new(config: BotConfig, dispatcher: Dispatcher, source: Box<dyn UpdateSource>) -> Self {
        Self {
            config,
            dispatcher,
            source,
            handshake: None,
        }
    }

    pub fn with_handshake(mut self, handshake: Arc<dyn Handshake>) -> Self {
        self.handshake = Some(handshake);
        self
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    /// Registers `start_handler` as `/start`, starts ingestion and dispatch, and returns
    /// without waiting for them.
    ///
    /// Updates of one chat are dispatched one at a time in arrival order; different chats
    /// run concurrently.
    ///
    /// `cancel` or `stop_signal` (whichever comes first) stops ingestion. A source still
    /// running one grace period later is aborted. Updates already received are still
    /// dispatched; in-flight handlers then get the grace period again and are aborted after it.
    #[instrument(skip_all)]
    pub async fn start<S>(
        self,
        cancel: CancellationToken,
        start_handler: HandlerRef,
        stop_signal: S,
    ) -> Result<Completion>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        self.config.validate()?;
        if self.config.offline {
            info!("offline mode, skipping transport handshake");
        } else if let Some(handshake) = &self.handshake {
            handshake.handshake().await?;
        }

        let Server {
            config,
            dispatcher,
            mut source,
            ..
        } = self;
        let dispatcher = Arc::new(dispatcher.command("/start", start_handler));

        let signal_cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = stop_signal => {
                    info!("stop signal received");
                    signal_cancel.cancel();
                }
                _ = signal_cancel.cancelled() => {}
            }
        });

        let (tx, rx) = mpsc::channel(UPDATE_BUFFER);
        let ingest_cancel = cancel.clone();
        let ingestion = tokio::spawn(async move { source.run(ingest_cancel, tx).await });

        let (done_tx, done_rx) = oneshot::channel();
        let grace = config.shutdown_grace;
        tokio::spawn(async move {
            let result = dispatch_loop(dispatcher, rx, ingestion, cancel, grace).await;
            let _ = done_tx.send(result);
        });

        info!(mode = ?config.mode, offline = config.offline, "bot started");
        Ok(Completion { rx: done_rx })
    }
}

/// Where a dispatch task sits in its chat's arrival order.
type ChainKey = Option<(i64, u64)>;

/// Per-chat arrival order: each chat keeps the completion signal of its newest task, and the
/// next task for that chat waits on it before dispatching.
#[derive(Default)]
struct ChatChains {
    tails: HashMap<i64, (u64, oneshot::Receiver<()>)>,
    next_seq: u64,
}

impl ChatChains {
    /// Queues `update` behind the previous update of its chat and spawns it.
    fn spawn(
        &mut self,
        tasks: &mut JoinSet<(ChainKey, DispatchOutcome)>,
        dispatcher: &Arc<Dispatcher>,
        update: Update,
        cancel: &CancellationToken,
    ) {
        let dispatcher = Arc::clone(dispatcher);
        let cancel = cancel.clone();
        let Some(chat_id) = update.chat_id() else {
            tasks.spawn(async move { (None, dispatcher.dispatch(update, cancel).await) });
            return;
        };

        self.next_seq += 1;
        let seq = self.next_seq;
        let (done_tx, done_rx) = oneshot::channel();
        let previous = self.tails.insert(chat_id, (seq, done_rx));
        tasks.spawn(async move {
            if let Some((_, previous)) = previous {
                // An error means the predecessor was aborted or panicked; it is done either way.
                let _ = previous.await;
            }
            let outcome = dispatcher.dispatch(update, cancel).await;
            let _ = done_tx.send(());
            (Some((chat_id, seq)), outcome)
        });
    }

    /// Forgets a chat once its newest task has finished.
    fn finished(&mut self, key: ChainKey) {
        if let Some((chat_id, seq)) = key {
            if self.tails.get(&chat_id).is_some_and(|(tail, _)| *tail == seq) {
                self.tails.remove(&chat_id);
            }
        }
    }
}

async fn dispatch_loop(
    dispatcher: Arc<Dispatcher>,
    mut rx: mpsc::Receiver<Update>,
    ingestion: JoinHandle<Result<()>>,
    cancel: CancellationToken,
    grace: Duration,
) -> Result<ShutdownReport> {
    let mut tasks: JoinSet<(ChainKey, DispatchOutcome)> = JoinSet::new();
    let mut chains = ChatChains::default();
    let mut report = ShutdownReport::default();
    // Set once cancellation is seen; the source must have stopped by then.
    let mut source_deadline: Option<Instant> = None;
    let mut source_aborted = false;

    // Runs until the source stops and its buffered updates are all spawned.
    loop {
        tokio::select! {
            update = rx.recv() => match update {
                Some(update) => chains.spawn(&mut tasks, &dispatcher, update, &cancel),
                None => break,
            },
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                chains.finished(record(&mut report, joined));
            }
            _ = cancel.cancelled(), if source_deadline.is_none() && !source_aborted => {
                source_deadline = Some(Instant::now() + grace);
            }
            _ = tokio::time::sleep_until(source_deadline.unwrap_or_else(Instant::now)),
                if source_deadline.is_some() =>
            {
                warn!(
                    grace_secs = grace.as_secs_f32(),
                    "update source still running after grace period, aborting it"
                );
                // Dropping the source's future drops its sender, which ends the loop.
                ingestion.abort();
                source_deadline = None;
                source_aborted = true;
            }
        }
    }

    let ingestion_result = match ingestion.await {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(KbotError::Ingestion(format!("update source task failed: {}", e))),
    };
    if let Err(e) = &ingestion_result {
        error!(error = %e, "update source stopped");
    }
    // Handlers watch the token; make sure they see the shutdown even without an explicit cancel.
    cancel.cancel();

    info!(in_flight = tasks.len(), grace_secs = grace.as_secs_f32(), "draining handlers");
    let drained = tokio::time::timeout(grace, async {
        while let Some(joined) = tasks.join_next().await {
            record(&mut report, joined);
        }
    })
    .await;
    if drained.is_err() {
        warn!(remaining = tasks.len(), "grace period elapsed, aborting handlers");
        tasks.abort_all();
        while let Some(joined) = tasks.join_next().await {
            record(&mut report, joined);
        }
    }

    info!(
        dispatched = report.dispatched,
        aborted = report.aborted,
        panicked = report.panicked,
        "bot stopped"
    );
    ingestion_result.map(|()| report)
}

fn record(
    report: &mut ShutdownReport,
    joined: std::result::Result<(ChainKey, DispatchOutcome), JoinError>,
) -> ChainKey {
    match joined {
        Ok((key, outcome)) => {
            debug!(outcome = ?outcome, "dispatch task finished");
            report.dispatched += 1;
            key
        }
        Err(e) if e.is_cancelled() => {
            report.aborted += 1;
            None
        }
        Err(e) => {
            error!(error = %e, "dispatch task panicked");
            report.panicked += 1;
            None
        }
    }
}
