//! Decorators: reusable scopes bound to functions.
//!
//! A [`ScopeDecorator`] holds one or more descriptors, built once from the
//! factory arguments. Every call enters all of them, runs the wrapped
//! function, and leaves them again in reverse order.
//!
//! ```rust,ignore
//! let create = decorate::forked_from("prod", None)?
//!     .decorate(|client: &MyClient| client.create_bucket("prod-copy"));
//! create.call(&client).await?;
//! ```

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;

use tigris_core::{Result, ScopeDescriptor, StorageClient, attach, isolate};

use crate::ScopeGuard;

/// A set of scopes entered together, outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeDecorator {
    descriptors: Vec<ScopeDescriptor>,
}

impl ScopeDecorator {
    /// Creates a decorator for a single scope.
    pub fn new(descriptor: ScopeDescriptor) -> Self {
        Self {
            descriptors: vec![descriptor],
        }
    }

    /// Returns the descriptors, outermost first.
    pub fn descriptors(&self) -> &[ScopeDescriptor] {
        &self.descriptors
    }

    /// Nests `inner` inside this decorator.
    pub fn wrap(mut self, inner: ScopeDecorator) -> Self {
        self.descriptors.extend(inner.descriptors);
        self
    }

    /// Runs `f` with every scope active.
    pub fn run<'a, C, F, T>(&self, client: &'a C, f: F) -> T
    where
        C: StorageClient + ?Sized,
        F: FnOnce(&'a C) -> T,
    {
        let _scopes = self.enter(client);
        f(client)
    }

    /// Awaits the future returned by `f` with every scope active.
    ///
    /// The future runs in its own context: the scopes stay active across
    /// every suspension point, are invisible to futures running alongside it,
    /// and are left when it completes or is dropped.
    pub async fn call<'a, C, F, Fut>(&self, client: &'a C, f: F) -> Fut::Output
    where
        C: StorageClient + ?Sized,
        F: FnOnce(&'a C) -> Fut,
        Fut: Future,
    {
        isolate(async {
            let _scopes = self.enter(client);
            f(client).await
        })
        .await
    }

    /// Binds this decorator to a function for repeated calls.
    pub fn decorate<'a, C, F, R>(&self, f: F) -> Decorated<'a, C, F>
    where
        C: StorageClient + ?Sized,
        F: Fn(&'a C) -> R,
    {
        Decorated {
            decorator: self.clone(),
            f,
            client: PhantomData,
        }
    }

    fn enter<C>(&self, client: &C) -> ScopeSet
    where
        C: StorageClient + ?Sized,
    {
        let stacks = attach(client);
        let guards = self
            .descriptors
            .iter()
            .map(|descriptor| ScopeGuard::push(stacks.clone(), descriptor.clone()))
            .collect();
        ScopeSet(guards)
    }
}

/// Guards released innermost first.
struct ScopeSet(Vec<ScopeGuard>);

impl Drop for ScopeSet {
    fn drop(&mut self) {
        while let Some(guard) = self.0.pop() {
            drop(guard);
        }
    }
}

/// A function bound to a [`ScopeDecorator`].
///
/// The function receives the client it is called with.
pub struct Decorated<'a, C: ?Sized, F> {
    decorator: ScopeDecorator,
    f: F,
    client: PhantomData<fn(&'a C)>,
}

impl<'a, C, F> Decorated<'a, C, F>
where
    C: StorageClient + ?Sized,
{
    /// Wraps this function in another decorator.
    ///
    /// The outer scopes are entered first and stay active for the whole
    /// window of the inner ones.
    pub fn decorate(self, outer: &ScopeDecorator) -> Self {
        Self {
            decorator: outer.clone().wrap(self.decorator),
            f: self.f,
            client: PhantomData,
        }
    }

    /// Returns the decorator bound to this function.
    pub fn decorator(&self) -> &ScopeDecorator {
        &self.decorator
    }

    /// Calls the function synchronously.
    pub fn run<R>(&self, client: &'a C) -> R
    where
        F: Fn(&'a C) -> R,
    {
        self.decorator.run(client, &self.f)
    }

    /// Calls the function and awaits its future.
    pub async fn call<Fut>(&self, client: &'a C) -> Fut::Output
    where
        F: Fn(&'a C) -> Fut,
        Fut: Future,
    {
        self.decorator.call(client, &self.f).await
    }
}

impl<C: ?Sized, F: Clone> Clone for Decorated<'_, C, F> {
    fn clone(&self) -> Self {
        Self {
            decorator: self.decorator.clone(),
            f: self.f.clone(),
            client: PhantomData,
        }
    }
}

impl<C: ?Sized, F> fmt::Debug for Decorated<'_, C, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decorated")
            .field("decorator", &self.decorator)
            .finish_non_exhaustive()
    }
}

/// Enables snapshots on buckets created by the decorated function.
pub fn snapshot_enabled() -> ScopeDecorator {
    ScopeDecorator::new(ScopeDescriptor::snapshot_enable())
}

/// Lists snapshots of `bucket`, or reads from `version` when given.
pub fn with_snapshot(bucket: &str, version: Option<&str>) -> Result<ScopeDecorator> {
    ScopeDescriptor::snapshot_select(bucket, version).map(ScopeDecorator::new)
}

/// Declares buckets created by the decorated function as forks of `source`.
pub fn forked_from(source: &str, version: Option<&str>) -> Result<ScopeDecorator> {
    ScopeDescriptor::fork(source, version).map(ScopeDecorator::new)
}

/// Former name of [`forked_from`].
#[deprecated(note = "use `forked_from` instead")]
pub fn fork_from(source: &str, version: Option<&str>) -> Result<ScopeDecorator> {
    forked_from(source, version)
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};

    use tigris_core::mock::MockStorageClient;
    use tigris_core::{StorageResponse, codec};

    use super::*;

    fn depth(client: &MockStorageClient) -> usize {
        attach(client).depth()
    }

    #[tokio::test]
    async fn test_forked_from_decorator() {
        let client = MockStorageClient::new();
        let create = forked_from("prod", Some("7"))
            .unwrap()
            .decorate(|client: &MockStorageClient| client.create_bucket("prod-copy"));

        create.call(&client).await.unwrap();
        create.call(&client).await.unwrap();
        client.create_bucket("plain").await.unwrap();

        let requests = client.requests();
        assert_eq!(requests.len(), 3);
        for request in &requests[..2] {
            assert_eq!(request.headers["x-tigris-fork-source-bucket"], "prod");
            assert_eq!(request.headers["x-tigris-fork-source-bucket-snapshot"], "7");
        }
        assert!(requests[2].headers.is_empty());
        assert_eq!(depth(&client), 0);
    }

    #[test]
    fn test_composed_decorators_nest() {
        let client = MockStorageClient::new();
        let inner = forked_from("prod", None)
            .unwrap()
            .decorate(|client: &MockStorageClient| {
                let stacks = attach(client);
                (stacks.depth(), stacks.current_headers())
            });
        let outer = inner.decorate(&snapshot_enabled());

        assert_eq!(
            outer.decorator().descriptors()[0],
            ScopeDescriptor::snapshot_enable()
        );

        let (depth_inside, headers) = outer.run(&client);
        assert_eq!(depth_inside, 2);
        assert_eq!(headers[codec::ENABLE_SNAPSHOT], "true");
        assert_eq!(headers[codec::FORK_SOURCE_BUCKET], "prod");
        assert_eq!(depth(&client), 0);
    }

    #[tokio::test]
    async fn test_error_restores_depth() {
        let client = MockStorageClient::new();
        client.fail_next("unavailable");

        let result = with_snapshot("data", Some("3"))
            .unwrap()
            .call(&client, |client| client.get_object("data", "k"))
            .await;

        assert!(result.is_err());
        assert_eq!(depth(&client), 0);
        assert_eq!(
            client.last_request().unwrap().headers["x-tigris-snapshot-version"],
            "3"
        );
    }

    #[test]
    fn test_panic_restores_depth() {
        let client = MockStorageClient::new();
        let decorator = snapshot_enabled().wrap(forked_from("prod", None).unwrap());

        let result: std::thread::Result<()> = panic::catch_unwind(AssertUnwindSafe(|| {
            decorator.run(&client, |_| panic!("boom"))
        }));

        assert!(result.is_err());
        assert_eq!(depth(&client), 0);
    }

    #[tokio::test]
    async fn test_joined_calls_do_not_share_scopes() {
        let client = MockStorageClient::new();
        client.yield_on_send(true);
        let fork = forked_from("prod", None)
            .unwrap()
            .decorate(|client: &MockStorageClient| client.create_bucket("copy"));
        let enable = snapshot_enabled();

        let (forked, enabled) = tokio::join!(
            fork.call(&client),
            enable.call(&client, |client| client.create_bucket("fresh")),
        );
        forked.unwrap();
        enabled.unwrap();

        for request in client.requests() {
            assert_eq!(request.headers.len(), 1);
        }
        assert_eq!(depth(&client), 0);
    }

    #[test]
    fn test_invalid_factory_arguments() {
        assert!(with_snapshot("", None).is_err());
        assert!(forked_from("prod", Some("")).is_err());
    }

    #[test]
    #[allow(deprecated)]
    fn test_fork_from_alias() {
        assert_eq!(
            fork_from("prod", Some("1")).unwrap(),
            forked_from("prod", Some("1")).unwrap()
        );
    }

    #[tokio::test]
    async fn test_list_snapshots_decorator() {
        let client = MockStorageClient::new()
            .with_response(tigris_core::Operation::ListBuckets, StorageResponse::ok());

        with_snapshot("data", None)
            .unwrap()
            .call(&client, |client| client.list_buckets())
            .await
            .unwrap();

        let request = client.last_request().unwrap();
        assert_eq!(request.headers["x-tigris-snapshot"], "data");
    }
}
