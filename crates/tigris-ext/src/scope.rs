//! Scoped blocks: RAII guards that keep a scope active while they live.
//!
//! A guard pushes its descriptor onto the client's scope stack when created
//! and pops it when dropped, whether the block returns normally, returns an
//! error, panics, or the enclosing future is cancelled.
//!
//! ```rust,ignore
//! let _snapshot = scope::select_snapshot(&client, "data", Some("12345"))?;
//! let object = client.get_object("data", "report.csv").await?;
//! ```
//!
//! Guards held by futures that run concurrently inside one task, for example
//! under `tokio::join!`, share that task's stack. Wrap each such future in
//! [`isolate`] to give it a stack of its own.

use std::sync::Arc;

pub use tigris_core::isolate;
use tigris_core::{
    Error, Result, ScopeDescriptor, ScopeStacks, ScopeToken, StorageClient, attach,
};

use crate::TRACING_TARGET_SCOPE;

/// An active scope on one client.
///
/// Guards must be released in reverse order of creation. A guard dropped out
/// of order logs an error; its scope stays active until every scope entered
/// after it has ended, and is then removed. Use [`exit`](Self::exit) to
/// observe the violation instead.
#[derive(Debug)]
#[must_use = "the scope ends as soon as the guard is dropped"]
pub struct ScopeGuard {
    stacks: Arc<ScopeStacks>,
    token: Option<ScopeToken>,
}

impl ScopeGuard {
    /// Pushes a descriptor onto the given stacks.
    pub fn push(stacks: Arc<ScopeStacks>, descriptor: ScopeDescriptor) -> Self {
        tracing::trace!(
            target: TRACING_TARGET_SCOPE,
            scope = %descriptor,
            "Entering scope"
        );

        let token = stacks.push(descriptor);
        Self {
            stacks,
            token: Some(token),
        }
    }

    /// Returns the stack depth of this scope (1 for the outermost).
    pub fn depth(&self) -> usize {
        self.token.as_ref().map_or(0, ScopeToken::depth)
    }

    /// Ends the scope and returns its descriptor.
    ///
    /// # Errors
    ///
    /// Returns an ordering violation together with the guard when a scope
    /// entered after this one is still active. The scope stays active; end
    /// the later scopes first, then exit the returned guard again.
    pub fn exit(mut self) -> Result<ScopeDescriptor, (Self, Error)> {
        let Some(token) = self.token.take() else {
            let err = Error::ordering_violation().with_message("scope guard was already released");
            return Err((self, err));
        };

        match self.stacks.pop(&token) {
            Ok(descriptor) => Ok(descriptor),
            Err(err) => {
                self.token = Some(token);
                Err((self, err))
            }
        }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };

        let depth = token.depth();
        match self.stacks.release(token) {
            Ok(descriptor) => {
                tracing::trace!(
                    target: TRACING_TARGET_SCOPE,
                    scope = %descriptor,
                    "Left scope"
                );
            }
            Err(err) => {
                tracing::error!(
                    target: TRACING_TARGET_SCOPE,
                    error = %err,
                    depth,
                    "Scope left out of order, deferring its removal"
                );
            }
        }
    }
}

/// Enters a scope on the client, attaching the header injector if needed.
pub fn enter<C>(client: &C, descriptor: ScopeDescriptor) -> ScopeGuard
where
    C: StorageClient + ?Sized,
{
    ScopeGuard::push(attach(client), descriptor)
}

/// Sends `X-Tigris-Enable-Snapshot: true` while the guard lives.
pub fn enable_snapshot<C>(client: &C) -> ScopeGuard
where
    C: StorageClient + ?Sized,
{
    enter(client, ScopeDescriptor::snapshot_enable())
}

/// Lists snapshots of `bucket`, or reads from `version` when given.
pub fn select_snapshot<C>(client: &C, bucket: &str, version: Option<&str>) -> Result<ScopeGuard>
where
    C: StorageClient + ?Sized,
{
    let descriptor = ScopeDescriptor::snapshot_select(bucket, version)?;
    Ok(enter(client, descriptor))
}

/// Turns `CreateBucket` calls into snapshot creation, optionally named.
pub fn create_snapshot<C>(client: &C, bucket: &str, name: Option<&str>) -> Result<ScopeGuard>
where
    C: StorageClient + ?Sized,
{
    let descriptor = ScopeDescriptor::snapshot_create(bucket, name)?;
    Ok(enter(client, descriptor))
}

/// Declares buckets created while the guard lives as forks of `source`.
pub fn declare_fork<C>(client: &C, source: &str, version: Option<&str>) -> Result<ScopeGuard>
where
    C: StorageClient + ?Sized,
{
    let descriptor = ScopeDescriptor::fork(source, version)?;
    Ok(enter(client, descriptor))
}

/// Runs `f` inside a scope.
pub fn with_scope<C, F, T>(client: &C, descriptor: ScopeDescriptor, f: F) -> T
where
    C: StorageClient + ?Sized,
    F: FnOnce() -> T,
{
    let _guard = enter(client, descriptor);
    f()
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};

    use tigris_core::mock::MockStorageClient;
    use tigris_core::{ErrorKind, Operation, codec};

    use super::*;

    fn depth(client: &MockStorageClient) -> usize {
        attach(client).depth()
    }

    #[tokio::test]
    async fn test_fork_scope_injects_headers() {
        let client = MockStorageClient::new();

        {
            let _fork = declare_fork(&client, "prod", Some("12345")).unwrap();
            client.create_bucket("prod-copy").await.unwrap();
        }
        client.create_bucket("plain").await.unwrap();

        let requests = client.requests();
        assert_eq!(requests[0].headers["x-tigris-fork-source-bucket"], "prod");
        assert_eq!(
            requests[0].headers["x-tigris-fork-source-bucket-snapshot"],
            "12345"
        );
        assert!(requests[1].headers.is_empty());
        assert_eq!(depth(&client), 0);
    }

    #[tokio::test]
    async fn test_fork_scope_leaves_object_writes_alone() {
        let client = MockStorageClient::new();
        let _fork = declare_fork(&client, "prod", None).unwrap();

        client.put_object("copy", "k", "v".into()).await.unwrap();
        client.delete_object("copy", "k").await.unwrap();

        assert_eq!(client.request_count(), 2);
        assert!(client.requests().iter().all(|r| r.headers.is_empty()));
    }

    #[tokio::test]
    async fn test_nested_scopes_merge_and_unwind() {
        let client = MockStorageClient::new();

        let enable = enable_snapshot(&client);
        let fork = declare_fork(&client, "prod", None).unwrap();
        assert_eq!(fork.depth(), 2);

        client.create_bucket("b").await.unwrap();
        let headers = client.last_request().unwrap().headers;
        assert_eq!(headers["x-tigris-enable-snapshot"], "true");
        assert_eq!(headers["x-tigris-fork-source-bucket"], "prod");

        fork.exit().unwrap();
        client.create_bucket("c").await.unwrap();
        let headers = client.last_request().unwrap().headers;
        assert!(headers.get("x-tigris-fork-source-bucket").is_none());
        assert_eq!(headers["x-tigris-enable-snapshot"], "true");

        enable.exit().unwrap();
        assert_eq!(depth(&client), 0);
    }

    #[tokio::test]
    async fn test_select_snapshot_list_and_read() {
        let client = MockStorageClient::new();

        {
            let _list = select_snapshot(&client, "data", None).unwrap();
            client.list_buckets().await.unwrap();
        }
        {
            let _read = select_snapshot(&client, "data", Some("42")).unwrap();
            client.get_object("data", "k").await.unwrap();
        }

        let requests = client.requests();
        assert_eq!(requests[0].headers["x-tigris-snapshot"], "data");
        assert_eq!(requests[1].headers["x-tigris-snapshot-version"], "42");
    }

    #[test]
    fn test_create_snapshot_headers() {
        let client = MockStorageClient::new();
        let _named = create_snapshot(&client, "data", Some("nightly")).unwrap();
        let headers = attach(&client).current_headers();
        assert_eq!(headers[codec::SNAPSHOT], "true; name=nightly");
    }

    #[test]
    fn test_invalid_arguments_push_nothing() {
        let client = MockStorageClient::new();
        let err = declare_fork(&client, "", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDescriptor);
        assert_eq!(depth(&client), 0);
    }

    #[test]
    fn test_out_of_order_exit_returns_guard() {
        let client = MockStorageClient::new();
        let outer = enable_snapshot(&client);
        let inner = declare_fork(&client, "prod", None).unwrap();

        let (outer, err) = outer.exit().unwrap_err();
        assert!(err.is_ordering_violation());
        assert_eq!(depth(&client), 2);

        inner.exit().unwrap();
        assert_eq!(outer.exit().unwrap(), ScopeDescriptor::snapshot_enable());
        assert_eq!(depth(&client), 0);
    }

    #[tokio::test]
    async fn test_out_of_order_drop_is_removed_later() {
        let client = MockStorageClient::new();
        let outer = declare_fork(&client, "prod", None).unwrap();
        let inner = enable_snapshot(&client);

        drop(outer);
        assert_eq!(depth(&client), 2);
        client.create_bucket("still-forked").await.unwrap();

        drop(inner);
        assert_eq!(depth(&client), 0);
        client.create_bucket("plain").await.unwrap();

        let requests = client.requests();
        assert_eq!(requests[0].headers["x-tigris-fork-source-bucket"], "prod");
        assert!(requests[1].headers.is_empty());
    }

    #[test]
    fn test_panic_unwinds_scope() {
        let client = MockStorageClient::new();

        let result: std::thread::Result<()> = panic::catch_unwind(AssertUnwindSafe(|| {
            with_scope(&client, ScopeDescriptor::snapshot_enable(), || {
                assert_eq!(depth(&client), 1);
                panic!("boom");
            })
        }));

        assert!(result.is_err());
        assert_eq!(depth(&client), 0);
    }

    #[test]
    fn test_error_return_unwinds_scope() {
        let client = MockStorageClient::new();

        let result: std::result::Result<(), &str> =
            with_scope(&client, ScopeDescriptor::snapshot_enable(), || Err("failed"));

        assert!(result.is_err());
        assert_eq!(depth(&client), 0);
    }

    #[tokio::test]
    async fn test_isolated_guards_in_one_task() {
        let client = MockStorageClient::new();

        let forked = isolate(async {
            let _fork = declare_fork(&client, "prod", None).unwrap();
            tokio::task::yield_now().await;
            client.create_bucket("fork").await.unwrap();
        });
        let reading = isolate(async {
            let _read = select_snapshot(&client, "data", Some("5")).unwrap();
            tokio::task::yield_now().await;
            client.get_object("data", "k").await.unwrap();
        });
        tokio::join!(forked, reading);

        for request in client.requests() {
            match request.operation {
                Operation::CreateBucket => {
                    assert_eq!(request.headers.len(), 1);
                    assert_eq!(request.headers["x-tigris-fork-source-bucket"], "prod");
                }
                _ => {
                    assert_eq!(request.headers.len(), 1);
                    assert_eq!(request.headers["x-tigris-snapshot-version"], "5");
                }
            }
        }
        assert_eq!(depth(&client), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_tasks_are_isolated() {
        let client = Arc::new(MockStorageClient::new());
        let barrier = Arc::new(tokio::sync::Barrier::new(2));

        let forked = {
            let client = Arc::clone(&client);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                let _fork = declare_fork(client.as_ref(), "prod", None).unwrap();
                barrier.wait().await;
                client.create_bucket("fork").await.unwrap();
            })
        };
        let plain = {
            let client = Arc::clone(&client);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                client.create_bucket("plain").await.unwrap();
            })
        };

        forked.await.unwrap();
        plain.await.unwrap();

        for request in client.requests() {
            match request.bucket.as_deref() {
                Some("fork") => assert_eq!(request.headers["x-tigris-fork-source-bucket"], "prod"),
                _ => assert!(request.headers.is_empty()),
            }
        }
    }
}
