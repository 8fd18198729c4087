//! Classifies updates and routes them to command, text and button handlers.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use kbot_core::{KbotError, Update, UpdateKind};
use kbot_keyboard::{KeyboardBuilder, KeyboardLimits, Registry, Resolved};
use kbot_state::{ChatGuard, ChatStateStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::context::Context;
use crate::handler::{Handler, HandlerRef};
use kbot_core::Transport;

/// Notice shown when a pressed button no longer resolves.
pub const STALE_NOTICE: &str = "This button is no longer available";

/// Receives every handler failure.
pub type ErrorHook = Arc<dyn Fn(&Update, &KbotError) + Send + Sync>;

/// What kind of event an update is, decided before any lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route<'a> {
    Command { name: &'a str, args: &'a str },
    Callback { chat_id: i64, data: &'a str },
    PlainText(&'a str),
    Unroutable(&'static str),
}

/// How one update was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler ran and returned `Ok`.
    Handled,
    /// A handler ran and failed or panicked; the error hook was called.
    Failed,
    /// Inert button; acknowledged only.
    Noop,
    /// Button token no longer resolves; acknowledged with [`STALE_NOTICE`].
    Stale,
    /// No handler matched (unknown command without hook, text without text handler).
    Dropped,
    /// Not routable at all (no chat, no text, unsupported kind).
    Unroutable,
}

/// Splits `/name@bot args` into (`/name`, `args`). `None` when `text` is not a command.
pub fn parse_command(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start();
    if !text.starts_with('/') {
        return None;
    }
    let (word, args) = match text.find(char::is_whitespace) {
        Some(i) => (&text[..i], text[i..].trim()),
        None => (text, ""),
    };
    let name = word.split('@').next().unwrap_or(word);
    if name.len() <= 1 {
        return None;
    }
    Some((name, args))
}

/// Decides the route of `update` without looking anything up.
pub fn classify(update: &Update) -> Route<'_> {
    match &update.kind {
        UpdateKind::Message(m) => match m.text.as_deref() {
            None => Route::Unroutable("message without text"),
            Some(text) => match parse_command(text) {
                Some((name, args)) => Route::Command { name, args },
                None => Route::PlainText(text),
            },
        },
        UpdateKind::CallbackQuery(q) => match (q.chat.as_ref(), q.data.as_deref()) {
            (Some(chat), Some(data)) => Route::Callback {
                chat_id: chat.id,
                data,
            },
            (None, _) => Route::Unroutable("callback without chat"),
            (_, None) => Route::Unroutable("callback without data"),
        },
        UpdateKind::Other(_) => Route::Unroutable("unsupported update kind"),
    }
}

fn normalize_command(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{}", name)
    }
}

/// Routes updates to handlers. Built once, then shared by every dispatch task.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    keyboards: KeyboardBuilder<dyn Handler>,
    store: ChatStateStore,
    commands: HashMap<String, HandlerRef>,
    text: Option<HandlerRef>,
    unknown_command: Option<HandlerRef>,
    error_hook: ErrorHook,
    delete_messages: bool,
    log_updates: bool,
}

impl Dispatcher {
    /// Creates a dispatcher with an empty routing table, default keyboard limits and a
    /// logging error hook.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            keyboards: KeyboardBuilder::new(Arc::new(Registry::default()), KeyboardLimits::default()),
            store: ChatStateStore::new(),
            commands: HashMap::new(),
            text: None,
            unknown_command: None,
            error_hook: Arc::new(|update: &Update, e: &KbotError| {
                error!(update_id = update.id, chat_id = ?update.chat_id(), error = %e, "handler failed");
            }),
            delete_messages: false,
            log_updates: false,
        }
    }

    /// Uses `registry` for callback tokens and `limits` for keyboard builds.
    pub fn with_keyboards(mut self, registry: Arc<Registry<dyn Handler>>, limits: KeyboardLimits) -> Self {
        self.keyboards = KeyboardBuilder::new(registry, limits);
        self
    }

    pub fn with_store(mut self, store: ChatStateStore) -> Self {
        self.store = store;
        self
    }

    /// Routes `/name` (leading slash optional here) to `handler`; replaces an earlier route.
    pub fn command(mut self, name: &str, handler: HandlerRef) -> Self {
        self.commands.insert(normalize_command(name), handler);
        self
    }

    /// Catch-all for text that is not a command.
    pub fn on_text(mut self, handler: HandlerRef) -> Self {
        self.text = Some(handler);
        self
    }

    /// Runs for commands with no route.
    pub fn on_unknown_command(mut self, handler: HandlerRef) -> Self {
        self.unknown_command = Some(handler);
        self
    }

    /// Replaces the error hook.
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Update, &KbotError) + Send + Sync + 'static,
    {
        self.error_hook = Arc::new(hook);
        self
    }

    /// Deletes a main message once a different one replaces it.
    pub fn delete_messages(mut self, enabled: bool) -> Self {
        self.delete_messages = enabled;
        self
    }

    /// Logs every inbound update at info level.
    pub fn log_updates(mut self, enabled: bool) -> Self {
        self.log_updates = enabled;
        self
    }

    pub fn has_command(&self, name: &str) -> bool {
        self.commands.contains_key(&normalize_command(name))
    }

    pub fn store(&self) -> &ChatStateStore {
        &self.store
    }

    pub fn registry(&self) -> &Arc<Registry<dyn Handler>> {
        self.keyboards.registry()
    }

    pub fn keyboards(&self) -> &KeyboardBuilder<dyn Handler> {
        &self.keyboards
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Routes one update to completion. Every button press is acknowledged exactly once,
    /// whatever the outcome.
    #[instrument(skip(self, update, cancel), fields(update_id = update.id))]
    pub async fn dispatch(&self, update: Update, cancel: CancellationToken) -> DispatchOutcome {
        if self.log_updates {
            info!(
                kind = update.kind_name(),
                chat_id = ?update.chat_id(),
                user_id = ?update.user().map(|u| u.id),
                "update received"
            );
        }
        let update = Arc::new(update);

        let outcome = match classify(&update) {
            Route::Command { name, .. } => {
                let handler = self
                    .commands
                    .get(name)
                    .or(self.unknown_command.as_ref())
                    .cloned();
                match handler {
                    Some(handler) => {
                        let chat = self.lock_chat(&update).await;
                        self.run(&handler, Arc::clone(&update), chat, cancel, None)
                            .await
                    }
                    None => {
                        debug!(command = name, "unknown command dropped");
                        DispatchOutcome::Dropped
                    }
                }
            }
            Route::PlainText(_) => match self.text.clone() {
                Some(handler) => {
                    let chat = self.lock_chat(&update).await;
                    self.run(&handler, Arc::clone(&update), chat, cancel, None)
                        .await
                }
                None => DispatchOutcome::Dropped,
            },
            Route::Callback { chat_id, data } => {
                // Resolve under the chat lock so a concurrent supersede cannot race the lookup.
                let chat = self.store.lock(chat_id).await;
                match self.registry().resolve(chat_id, data) {
                    Resolved::Handler(handler) => {
                        let answered = Arc::new(AtomicBool::new(false));
                        let outcome = self
                            .run(
                                &handler,
                                Arc::clone(&update),
                                chat,
                                cancel,
                                Some(Arc::clone(&answered)),
                            )
                            .await;
                        if !answered.load(Ordering::SeqCst) {
                            self.acknowledge(&update, None).await;
                        }
                        outcome
                    }
                    Resolved::Noop => {
                        drop(chat);
                        self.acknowledge(&update, None).await;
                        DispatchOutcome::Noop
                    }
                    Resolved::NotFound => {
                        drop(chat);
                        debug!(chat_id = chat_id, token = data, "stale callback");
                        self.acknowledge(&update, Some(STALE_NOTICE)).await;
                        DispatchOutcome::Stale
                    }
                }
            }
            Route::Unroutable(reason) => {
                debug!(reason = reason, kind = update.kind_name(), "update dropped");
                if matches!(update.kind, UpdateKind::CallbackQuery(_)) {
                    self.acknowledge(&update, None).await;
                }
                DispatchOutcome::Unroutable
            }
        };

        debug!(outcome = ?outcome, "dispatch finished");
        outcome
    }

    async fn lock_chat(&self, update: &Update) -> ChatGuard {
        // Messages always carry a chat; classify() only routes updates that have one.
        let chat_id = update.chat_id().unwrap_or_default();
        self.store.lock(chat_id).await
    }

    async fn run(
        &self,
        handler: &HandlerRef,
        update: Arc<Update>,
        chat: ChatGuard,
        cancel: CancellationToken,
        answered: Option<Arc<AtomicBool>>,
    ) -> DispatchOutcome {
        let handler_name = std::any::type_name_of_val(handler.as_ref());
        let chat_id = chat.chat_id;
        info!(chat_id = chat_id, handler = %handler_name, "step: handler processing");

        let ctx = Context::new(
            Arc::clone(&update),
            chat,
            Arc::clone(&self.transport),
            self.keyboards.clone(),
            cancel,
            answered.unwrap_or_default(),
            self.delete_messages,
        );
        // A panic drops the context (and the chat lock) and is reported like any failure.
        let result = match AssertUnwindSafe(handler.handle(ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(KbotError::handler(format!(
                "handler panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };
        match result {
            Ok(()) => {
                info!(chat_id = chat_id, "step: handler done");
                DispatchOutcome::Handled
            }
            Err(e) => {
                (self.error_hook)(&update, &e);
                DispatchOutcome::Failed
            }
        }
    }

    async fn acknowledge(&self, update: &Update, notice: Option<&str>) {
        let UpdateKind::CallbackQuery(query) = &update.kind else {
            return;
        };
        if let Err(e) = self.transport.answer_callback(&query.id, notice).await {
            warn!(callback_id = %query.id, error = %e, "failed to acknowledge callback");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "non-string payload"
    }
}
