//! Handler registry: maps callback tokens to handler references and back.
//!
//! Scoped (dense) registrations belong to one keyboard build and one chat and go away when
//! that keyboard is released or evicted. Global registrations are keyed by handler identity
//! (`Arc` pointer) and live until unregistered or until the registry is dropped.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use kbot_core::KeyboardId;
use tracing::debug;

use crate::token::{self, Decoded};

/// How button handlers are turned into callback tokens. There is no default: every
/// keyboard build names its policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Index into the keyboard's own table; smallest tokens, expire with the keyboard.
    DenseIndex,
    /// One process-wide id per distinct handler; valid across keyboards and chats.
    ///
    /// The registry keeps the handler until [`Registry::unregister_global`], so use it for
    /// long-lived handlers. A fresh `Arc` per build registers a new id every time.
    Global,
}

/// Result of resolving a callback token.
pub enum Resolved<H: ?Sized> {
    Handler(Arc<H>),
    /// Inert button; acknowledge and do nothing.
    Noop,
    /// Unknown, expired, foreign-chat or malformed token.
    NotFound,
}

impl<H: ?Sized> Resolved<H> {
    pub fn handler(self) -> Option<Arc<H>> {
        match self {
            Resolved::Handler(h) => Some(h),
            _ => None,
        }
    }
}

struct Scope<H: ?Sized> {
    chat_id: i64,
    handlers: Vec<Arc<H>>,
}

struct Tables<H: ?Sized> {
    next_scope: u64,
    scopes: BTreeMap<u64, Scope<H>>,
    next_global: u64,
    globals: HashMap<u64, Arc<H>>,
    global_ids: HashMap<usize, u64>,
}

impl<H: ?Sized> Tables<H> {
    fn global_id(&mut self, handler: &Arc<H>) -> u64 {
        let key = identity(handler);
        if let Some(id) = self.global_ids.get(&key) {
            return *id;
        }
        let id = self.next_global;
        self.next_global += 1;
        self.globals.insert(id, Arc::clone(handler));
        self.global_ids.insert(key, id);
        id
    }
}

/// Process-wide token table, shared by every chat. Lock is held only for table operations.
pub struct Registry<H: ?Sized> {
    tables: Mutex<Tables<H>>,
    max_live_scopes: usize,
}

/// Default cap on simultaneously live keyboard scopes.
pub const DEFAULT_MAX_LIVE_SCOPES: usize = 10_000;

impl<H: ?Sized> Default for Registry<H> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LIVE_SCOPES)
    }
}

impl<H: ?Sized> Registry<H> {
    /// Creates a registry keeping at most `max_live_scopes` keyboard scopes; the oldest is
    /// evicted when a new one would exceed the cap.
    pub fn new(max_live_scopes: usize) -> Self {
        Self {
            tables: Mutex::new(Tables {
                next_scope: 1,
                scopes: BTreeMap::new(),
                next_global: 1,
                globals: HashMap::new(),
                global_ids: HashMap::new(),
            }),
            max_live_scopes: max_live_scopes.max(1),
        }
    }

    fn tables(&self) -> MutexGuard<'_, Tables<H>> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Opens a fresh registration scope for one keyboard built for `chat_id`.
    pub fn open_scope(&self, chat_id: i64) -> KeyboardId {
        let mut t = self.tables();
        while t.scopes.len() >= self.max_live_scopes {
            match t.scopes.pop_first() {
                Some((evicted, scope)) => {
                    debug!(scope = evicted, chat_id = scope.chat_id, "evicted oldest keyboard scope")
                }
                None => break,
            }
        }
        let id = t.next_scope;
        t.next_scope += 1;
        t.scopes.insert(
            id,
            Scope {
                chat_id,
                handlers: Vec::new(),
            },
        );
        KeyboardId(id)
    }

    /// Registers `handler` and returns its token.
    ///
    /// `DenseIndex` appends to `scope`'s table; `None` when the scope is no longer live.
    /// `Global` ignores `scope` and returns the handler's existing id if it has one.
    pub fn register(&self, scope: KeyboardId, encoding: Encoding, handler: &Arc<H>) -> Option<String> {
        let mut t = self.tables();
        match encoding {
            Encoding::DenseIndex => {
                let entry = t.scopes.get_mut(&scope.0)?;
                entry.handlers.push(Arc::clone(handler));
                Some(token::encode_scoped(scope.0, entry.handlers.len() - 1))
            }
            Encoding::Global => Some(token::encode_global(t.global_id(handler))),
        }
    }

    /// Registers `handler` globally; shorthand for `register(_, Encoding::Global, _)`.
    pub fn register_global(&self, handler: &Arc<H>) -> String {
        let id = self.tables().global_id(handler);
        token::encode_global(id)
    }

    /// Resolves a token pressed in `chat_id`.
    pub fn resolve(&self, chat_id: i64, token: &str) -> Resolved<H> {
        let Some(decoded) = token::decode(token) else {
            return Resolved::NotFound;
        };
        let t = self.tables();
        match decoded {
            Decoded::Noop => Resolved::Noop,
            Decoded::Scoped { scope, index } => t
                .scopes
                .get(&scope)
                .filter(|s| s.chat_id == chat_id)
                .and_then(|s| s.handlers.get(index))
                .map(|h| Resolved::Handler(Arc::clone(h)))
                .unwrap_or(Resolved::NotFound),
            Decoded::Global { id } => t
                .globals
                .get(&id)
                .map(|h| Resolved::Handler(Arc::clone(h)))
                .unwrap_or(Resolved::NotFound),
        }
    }

    /// Removes `handler`'s global id; its token resolves to `NotFound` afterwards and a later
    /// registration gets a new id. `false` when the handler was not registered.
    pub fn unregister_global(&self, handler: &Arc<H>) -> bool {
        let mut t = self.tables();
        match t.global_ids.remove(&identity(handler)) {
            Some(id) => t.globals.remove(&id).is_some(),
            None => false,
        }
    }

    /// Drops a keyboard scope; its tokens resolve to `NotFound` afterwards.
    pub fn release(&self, scope: KeyboardId) -> bool {
        self.tables().scopes.remove(&scope.0).is_some()
    }

    /// Number of handlers registered in `scope`, if it is live.
    pub fn scope_len(&self, scope: KeyboardId) -> Option<usize> {
        self.tables().scopes.get(&scope.0).map(|s| s.handlers.len())
    }

    pub fn live_scopes(&self) -> usize {
        self.tables().scopes.len()
    }

    pub fn global_count(&self) -> usize {
        self.tables().globals.len()
    }
}

/// Handler identity is the address of its allocation; the registry keeps the `Arc`
/// alive, so the address cannot be reused while the id exists.
fn identity<H: ?Sized>(handler: &Arc<H>) -> usize {
    Arc::as_ptr(handler).cast::<()>() as usize
}
