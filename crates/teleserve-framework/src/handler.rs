//! Handler trait and type erasure.
//!
//! Any async closure or function taking `Arc<UpdateContext>` and returning a
//! [`HandlerResult`] is a handler:
//!
//! ```rust,ignore
//! async fn ping(ctx: Arc<UpdateContext>) -> HandlerResult {
//!     ctx.reply("pong").await?;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::UpdateContext;
use crate::error::HandlerResult;

/// A type alias for a boxed, pinned future that is `Send`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Processes an update.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: Arc<UpdateContext>) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Arc<UpdateContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, ctx: Arc<UpdateContext>) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self)(ctx))
    }
}

/// A type-erased handler that can be stored in collections.
pub type BoxedHandler = Arc<dyn Handler>;

/// Converts a handler into a [`BoxedHandler`].
pub fn into_handler<H: Handler>(handler: H) -> BoxedHandler {
    Arc::new(handler)
}
