//! Shared helpers for kbot-router integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kbot_core::testing::RecordingTransport;
use kbot_core::{MessageTarget, Transport};
use kbot_router::{handler_fn, Dispatcher, HandlerRef};

pub const CHAT: i64 = 456;

/// Dispatcher over a fresh recording transport.
pub fn dispatcher() -> (Arc<RecordingTransport>, Dispatcher) {
    let transport = Arc::new(RecordingTransport::new());
    let dispatcher = Dispatcher::new(Arc::clone(&transport) as Arc<dyn Transport>);
    (transport, dispatcher)
}

/// Handler that counts its runs and does nothing else.
pub fn counting() -> (Arc<AtomicUsize>, HandlerRef) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    let handler = handler_fn(move |_ctx| {
        let c = Arc::clone(&c);
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });
    (count, handler)
}

/// Handler that puts `text` into the main message with `target`, no keyboard.
pub fn main_text(target: MessageTarget, text: &'static str) -> HandlerRef {
    handler_fn(move |mut ctx| async move {
        ctx.send_main(target, text, None).await?;
        Ok(())
    })
}
