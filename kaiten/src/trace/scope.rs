//! Ambient trace-context propagation.
//!
//! The active [`TraceContext`] lives in a tokio task-local. Activation is
//! always scoped: the context is installed for the duration of a future (or
//! closure) and the previous one is restored when it completes, is dropped
//! or unwinds. Scopes nest, so an inner activation shadows the outer one
//! until it ends.
//!
//! Futures joined inside the same task (as the execution engine does with
//! `join_all`) each carry their own scope. Spawned tasks do not inherit the
//! context; wrap the spawned future with [`scope`] explicitly.

use std::future::Future;
use std::sync::Arc;

use super::context::TraceContext;

tokio::task_local! {
    static CURRENT: Arc<TraceContext>;
}

/// The active trace context, if any.
#[must_use]
pub fn current() -> Option<Arc<TraceContext>> {
    CURRENT.try_with(Arc::clone).ok()
}

/// Run `fut` with `ctx` as the active context.
pub async fn scope<F>(ctx: Arc<TraceContext>, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT.scope(ctx, fut).await
}

/// Run `f` synchronously with `ctx` as the active context.
pub fn sync_scope<R>(ctx: Arc<TraceContext>, f: impl FnOnce() -> R) -> R {
    CURRENT.sync_scope(ctx, f)
}
