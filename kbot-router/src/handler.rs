//! Handler trait and closure adapter.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use kbot_core::Result;
use kbot_keyboard::ButtonSpec;

use crate::context::Context;

/// Application code run for a command, a text message or a button press.
///
/// The handler owns its [`Context`] for the whole run; the chat stays locked until the
/// context is dropped.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: Context) -> Result<()>;
}

/// Shared handler reference. Identity (for global callback ids) is the `Arc` allocation.
pub type HandlerRef = Arc<dyn Handler>;

/// Button whose press runs a [`Handler`].
pub type Button = ButtonSpec<dyn Handler>;

/// Button that runs `handler` when pressed.
pub fn button(label: impl Into<String>, handler: &HandlerRef) -> Button {
    ButtonSpec::new(label, Arc::clone(handler))
}

/// Handler built from an async closure; see [`handler_fn`].
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn handle(&self, ctx: Context) -> Result<()> {
        (self.f)(ctx).await
    }
}

/// Wraps an async closure as a [`HandlerRef`].
///
/// ```ignore
/// let hello = handler_fn(|mut ctx: Context| async move {
///     ctx.send_main(MessageTarget::NoChange, "hello", None).await?;
///     Ok(())
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> HandlerRef
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}
