//! Update dispatcher.
//!
//! When an update arrives the dispatcher:
//!
//! 1. Wraps it in an [`UpdateContext`]
//! 2. Runs every middleware `before` hook in order, dropping the update if one refuses it
//! 3. Runs matchers in registration order, stopping after a blocking match
//! 4. Runs middleware `after` hooks in reverse order
//!
//! ```rust,ignore
//! let dispatcher = Dispatcher::new()
//!     .with_middleware(LoggingMiddleware)
//!     .with_middleware(ThrottlingMiddleware::default())
//!     .with(on_command("start").handler(start));
//! ```

use std::sync::Arc;

use teleserve_core::{TelegramApi, Update};
use tracing::{Instrument, Level, debug, span};

use crate::context::UpdateContext;
use crate::matcher::Matcher;
use crate::middleware::Middleware;

/// Whether an update reached the matchers and whether any of them matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A middleware dropped the update.
    Dropped,
    /// The update went through the matchers; `matched` tells if any matched.
    Handled { matched: bool },
}

/// Routes updates through middlewares to matchers.
///
/// Cloning is cheap and shares the registered middlewares.
#[derive(Default, Clone)]
pub struct Dispatcher {
    middlewares: Vec<Arc<dyn Middleware>>,
    matchers: Vec<Matcher>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a middleware. Middlewares run in the order they are added.
    pub fn add_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        self.middlewares.push(Arc::new(middleware));
    }

    /// Adds a shared middleware.
    pub fn add_middleware_arc(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    /// Adds a middleware (builder pattern).
    pub fn with_middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.add_middleware(middleware);
        self
    }

    /// Adds a matcher. Matchers are checked in the order they are added.
    pub fn add(&mut self, matcher: Matcher) {
        self.matchers.push(matcher);
    }

    /// Adds a matcher (builder pattern).
    pub fn with(mut self, matcher: Matcher) -> Self {
        self.matchers.push(matcher);
        self
    }

    /// Adds several matchers at once.
    pub fn register_matchers(&mut self, matchers: impl IntoIterator<Item = Matcher>) {
        self.matchers.extend(matchers);
    }

    pub fn matcher_count(&self) -> usize {
        self.matchers.len()
    }

    pub fn middleware_count(&self) -> usize {
        self.middlewares.len()
    }

    /// Dispatches one update received by `bot_name`.
    pub async fn dispatch(
        &self,
        update: Update,
        bot_name: &str,
        api: Arc<TelegramApi>,
    ) -> DispatchOutcome {
        let span = span!(
            Level::DEBUG,
            "dispatch",
            bot = %bot_name,
            update_id = update.update_id,
            kind = update.kind()
        );
        let ctx = Arc::new(UpdateContext::new(update, bot_name, api));
        self.dispatch_context(ctx).instrument(span).await
    }

    /// Dispatches an already built context.
    pub async fn dispatch_context(&self, ctx: Arc<UpdateContext>) -> DispatchOutcome {
        for middleware in &self.middlewares {
            if !middleware.before(&ctx).await {
                debug!("Update dropped by middleware");
                return DispatchOutcome::Dropped;
            }
        }

        let mut matched = false;
        for matcher in &self.matchers {
            if matcher.execute(Arc::clone(&ctx)).await {
                matched = true;
                if matcher.is_blocking() {
                    debug!(
                        matcher = matcher.get_name().unwrap_or("unnamed"),
                        "Blocking matcher matched, stopping dispatch"
                    );
                    break;
                }
            }
        }

        for middleware in self.middlewares.iter().rev() {
            middleware.after(&ctx).await;
        }

        DispatchOutcome::Handled { matched }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HandlerResult;
    use crate::matcher_builders::{on_callback, on_command, on_message};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use tower::ServiceExt;

    fn api() -> Arc<TelegramApi> {
        Arc::new(TelegramApi::with_base("1:test", "http://127.0.0.1:9").unwrap())
    }

    fn text_update(text: &str) -> Update {
        Update::from_value(json!({
            "update_id": 1,
            "message": {
                "message_id": 1,
                "from": {"id": 5, "first_name": "T"},
                "chat": {"id": 5, "type": "private"},
                "date": 0,
                "text": text
            }
        }))
        .unwrap()
    }

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder(log: &Log, entry: &'static str) -> impl crate::Handler {
        let log = Arc::clone(log);
        move |_ctx: Arc<UpdateContext>| {
            let log = Arc::clone(&log);
            async move {
                log.lock().push(entry.to_string());
                HandlerResult::Ok(())
            }
        }
    }

    struct Recording {
        name: &'static str,
        allow: bool,
        log: Log,
    }

    #[async_trait]
    impl Middleware for Recording {
        async fn before(&self, _ctx: &UpdateContext) -> bool {
            self.log.lock().push(format!("{}:before", self.name));
            self.allow
        }

        async fn after(&self, _ctx: &UpdateContext) {
            self.log.lock().push(format!("{}:after", self.name));
        }
    }

    #[tokio::test]
    async fn test_blocking_matcher_stops_dispatch() {
        let log: Log = Arc::default();
        let dispatcher = Dispatcher::new()
            .with(on_command("start").handler(recorder(&log, "start")))
            .with(on_message().handler(recorder(&log, "message")));

        let outcome = dispatcher.dispatch(text_update("/start"), "main", api()).await;
        assert_eq!(outcome, DispatchOutcome::Handled { matched: true });
        assert_eq!(*log.lock(), vec!["start"]);

        log.lock().clear();
        dispatcher.dispatch(text_update("hi"), "main", api()).await;
        assert_eq!(*log.lock(), vec!["message"]);
    }

    #[tokio::test]
    async fn test_unmatched_update() {
        let dispatcher = Dispatcher::new().with(on_callback("help"));
        let outcome = dispatcher.dispatch(text_update("hi"), "main", api()).await;
        assert_eq!(outcome, DispatchOutcome::Handled { matched: false });
    }

    #[tokio::test]
    async fn test_middleware_order_and_drop() {
        let log: Log = Arc::default();
        let dispatcher = Dispatcher::new()
            .with_middleware(Recording { name: "a", allow: true, log: Arc::clone(&log) })
            .with_middleware(Recording { name: "b", allow: true, log: Arc::clone(&log) })
            .with(on_message().handler(recorder(&log, "handler")));

        dispatcher.dispatch(text_update("hi"), "main", api()).await;
        assert_eq!(
            *log.lock(),
            vec!["a:before", "b:before", "handler", "b:after", "a:after"]
        );

        let log: Log = Arc::default();
        let dispatcher = Dispatcher::new()
            .with_middleware(Recording { name: "deny", allow: false, log: Arc::clone(&log) })
            .with(on_message().handler(recorder(&log, "handler")));
        let outcome = dispatcher.dispatch(text_update("hi"), "main", api()).await;
        assert_eq!(outcome, DispatchOutcome::Dropped);
        assert_eq!(*log.lock(), vec!["deny:before"]);
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_stop_others() {
        let log: Log = Arc::default();
        let matcher = on_message()
            .handler(|_ctx: Arc<UpdateContext>| async move {
                Err::<(), _>(crate::HandlerError::custom("boom"))
            })
            .handler(recorder(&log, "second"));
        let dispatcher = Dispatcher::new().with(matcher);

        dispatcher.dispatch(text_update("hi"), "main", api()).await;
        assert_eq!(*log.lock(), vec!["second"]);
    }

    #[tokio::test]
    async fn test_matcher_as_tower_service() {
        let log: Log = Arc::default();
        let matcher = on_command("help").handler(recorder(&log, "help"));
        let ctx = Arc::new(UpdateContext::new(text_update("/help"), "main", api()));

        let response = matcher.oneshot(ctx).await.unwrap();
        assert!(response.should_stop());
        assert_eq!(*log.lock(), vec!["help"]);
    }
}
