//! Identity of the execution context a scope belongs to.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use tokio::task;

tokio::task_local! {
    /// Contexts entered through [`isolate`], outermost first.
    static LINEAGE: Arc<[ContextId]>;
}

static NEXT_ISOLATED: AtomicU64 = AtomicU64::new(0);

/// Key of a scope stack within one client.
///
/// Inside a tokio task the context is the task; anywhere else it is the OS
/// thread. A task spawned from inside a scope starts with an empty stack.
/// Futures wrapped in [`isolate`] get a context of their own, so several of
/// them can run concurrently inside one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextId {
    /// A tokio task.
    Task(task::Id),
    /// An OS thread running outside of any tokio task.
    Thread(ThreadId),
    /// A future wrapped in [`isolate`].
    Isolated(u64),
}

impl ContextId {
    /// Returns the context of the caller.
    pub fn current() -> Self {
        LINEAGE
            .try_with(|lineage| lineage.last().copied())
            .ok()
            .flatten()
            .unwrap_or_else(Self::root)
    }

    /// Returns the caller's context and every context it was isolated from,
    /// outermost first.
    pub fn lineage() -> Vec<Self> {
        LINEAGE
            .try_with(|lineage| lineage.to_vec())
            .unwrap_or_else(|_| vec![Self::root()])
    }

    /// Returns whether this context is a tokio task.
    pub fn is_task(&self) -> bool {
        matches!(self, Self::Task(_))
    }

    /// Returns whether this context was created by [`isolate`].
    pub fn is_isolated(&self) -> bool {
        matches!(self, Self::Isolated(_))
    }

    fn root() -> Self {
        match task::try_id() {
            Some(id) => Self::Task(id),
            None => Self::Thread(thread::current().id()),
        }
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Task(id) => write!(f, "task:{id}"),
            Self::Thread(id) => write!(f, "thread:{id:?}"),
            Self::Isolated(id) => write!(f, "isolated:{id}"),
        }
    }
}

/// Runs `future` in a fresh context nested in the caller's.
///
/// Scopes entered inside the future are invisible to everything outside it,
/// including sibling futures polled by the same task through `join!` or
/// `select!`. The future still sees the scopes that were active where
/// `isolate` was called.
pub fn isolate<F: Future>(future: F) -> impl Future<Output = F::Output> {
    let mut lineage = ContextId::lineage();
    lineage.push(ContextId::Isolated(
        NEXT_ISOLATED.fetch_add(1, Ordering::Relaxed),
    ));
    LINEAGE.scope(lineage.into(), future)
}
