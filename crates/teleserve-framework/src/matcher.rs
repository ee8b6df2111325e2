//! Matcher system.
//!
//! A [`Matcher`] groups handlers behind a common check. When the check
//! passes, every handler runs in order; a blocking matcher then stops the
//! dispatcher from trying further matchers.
//!
//! ```rust,ignore
//! let matcher = Matcher::new()
//!     .name("ping")
//!     .check(|ctx| ctx.text() == Some("ping"))
//!     .block(true)
//!     .handler(|ctx: Arc<UpdateContext>| async move {
//!         ctx.reply("pong").await?;
//!         Ok(())
//!     });
//! ```
//!
//! `Matcher` also implements `tower::Service<Arc<UpdateContext>>`, so tower
//! layers such as timeouts can wrap it.

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::Service;
use tracing::{debug, error, trace};

use crate::context::UpdateContext;
use crate::handler::{BoxFuture, BoxedHandler, Handler, into_handler};

/// A type-erased check function.
pub type CheckFn = Arc<dyn Fn(&UpdateContext) -> bool + Send + Sync>;

#[derive(Clone)]
struct MatcherInner {
    check_fn: Option<CheckFn>,
    handlers: Vec<BoxedHandler>,
    block: bool,
    name: Option<String>,
}

/// A group of handlers with a common check rule.
///
/// Cloning is cheap; the contents live behind an `Arc`.
#[derive(Clone)]
pub struct Matcher {
    inner: Arc<MatcherInner>,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Matcher {
    /// Creates an empty matcher. Without a check it matches every update.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MatcherInner {
                check_fn: None,
                handlers: Vec::new(),
                block: false,
                name: None,
            }),
        }
    }

    fn inner_mut(&mut self) -> &mut MatcherInner {
        Arc::make_mut(&mut self.inner)
    }

    /// Sets a name, used in logs.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.inner_mut().name = Some(name.into());
        self
    }

    /// Sets the check function.
    pub fn check<F>(mut self, f: F) -> Self
    where
        F: Fn(&UpdateContext) -> bool + Send + Sync + 'static,
    {
        self.inner_mut().check_fn = Some(Arc::new(f));
        self
    }

    /// Sets whether a match stops further matchers.
    pub fn block(mut self, block: bool) -> Self {
        self.inner_mut().block = block;
        self
    }

    /// Adds a handler. Handlers run in the order they were added.
    pub fn handler<H: Handler>(mut self, handler: H) -> Self {
        self.inner_mut().handlers.push(into_handler(handler));
        self
    }

    /// Adds a pre-built boxed handler.
    pub fn handler_boxed(mut self, handler: BoxedHandler) -> Self {
        self.inner_mut().handlers.push(handler);
        self
    }

    pub fn matches(&self, ctx: &UpdateContext) -> bool {
        match &self.inner.check_fn {
            Some(f) => f(ctx),
            None => true,
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.inner.block
    }

    pub fn handler_count(&self) -> usize {
        self.inner.handlers.len()
    }

    pub fn get_name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Runs all handlers if the check passes.
    ///
    /// Returns `true` if the check passed. Handler errors are logged and do
    /// not stop the remaining handlers.
    pub async fn execute(&self, ctx: Arc<UpdateContext>) -> bool {
        let name = self.inner.name.as_deref().unwrap_or("unnamed");
        if !self.matches(&ctx) {
            trace!(matcher = name, "Matcher check failed, skipping");
            return false;
        }

        debug!(
            matcher = name,
            handler_count = self.inner.handlers.len(),
            "Matcher check passed, executing handlers"
        );

        for (i, handler) in self.inner.handlers.iter().enumerate() {
            if let Err(e) = handler.call(Arc::clone(&ctx)).await {
                error!(
                    matcher = name,
                    handler_index = i,
                    bot = %ctx.bot_name(),
                    error = %e,
                    "Handler failed"
                );
            }
        }

        true
    }
}

// ============================================================================
// Tower Service Implementation
// ============================================================================

/// Outcome of running a matcher as a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatcherResponse {
    pub matched: bool,
    pub blocking: bool,
}

impl MatcherResponse {
    /// True if the dispatcher should stop after this matcher.
    pub fn should_stop(&self) -> bool {
        self.matched && self.blocking
    }
}

impl Service<Arc<UpdateContext>> for Matcher {
    type Response = MatcherResponse;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, ctx: Arc<UpdateContext>) -> Self::Future {
        let matcher = self.clone();
        Box::pin(async move {
            let matched = matcher.execute(ctx).await;
            Ok(MatcherResponse {
                matched,
                blocking: matcher.is_blocking(),
            })
        })
    }
}
