//! Client façade bundling a storage client with the Tigris extensions.

use std::ops::Deref;
use std::sync::Arc;

use tigris_core::{
    HookConfig, HookRegistry, Result, ScopeDescriptor, ScopeStacks, StorageClient, StorageRequest,
    StorageResponse, attach,
};

use crate::helpers::{self, BucketDetails};
use crate::{ScopeGuard, TRACING_TARGET_CLIENT, scope};

/// A storage client with Tigris snapshot and fork support.
///
/// Every [`StorageClient`] operation is forwarded to the wrapped client, and
/// anything else the wrapped client offers is reachable through [`Deref`].
/// The scope header injector is attached on construction.
#[derive(Debug)]
pub struct TigrisClient<C> {
    inner: C,
}

impl<C: StorageClient> TigrisClient<C> {
    /// Wraps a configured client using the default hook configuration.
    pub fn new(inner: C) -> Self {
        Self::with_config(inner, HookConfig::default())
    }

    /// Wraps a configured client.
    ///
    /// If the client already has the injector attached, its existing
    /// configuration is kept.
    pub fn with_config(inner: C, config: HookConfig) -> Self {
        let operations = config.operations.clone();
        inner.hooks().attach_with(config);
        tracing::debug!(
            target: TRACING_TARGET_CLIENT,
            ?operations,
            "Tigris client initialized"
        );
        Self { inner }
    }

    /// Returns the wrapped client.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Unwraps the client. The injector stays attached to it.
    pub fn into_inner(self) -> C {
        self.inner
    }

    /// Returns the scope stacks of this client.
    pub fn scopes(&self) -> Arc<ScopeStacks> {
        attach(&self.inner)
    }

    /// Enters an arbitrary scope.
    pub fn scope(&self, descriptor: ScopeDescriptor) -> ScopeGuard {
        scope::enter(self, descriptor)
    }

    /// Enables snapshots on buckets created while the guard lives.
    pub fn snapshot_enabled(&self) -> ScopeGuard {
        scope::enable_snapshot(self)
    }

    /// Lists snapshots of `bucket`, or reads from `version` while the guard lives.
    pub fn snapshot_context(&self, bucket: &str, version: Option<&str>) -> Result<ScopeGuard> {
        scope::select_snapshot(self, bucket, version)
    }

    /// Declares buckets created while the guard lives as forks of `source`.
    pub fn fork_context(&self, source: &str, version: Option<&str>) -> Result<ScopeGuard> {
        scope::declare_fork(self, source, version)
    }

    /// See [`helpers::create_snapshot_bucket`].
    pub async fn create_snapshot_bucket(&self, bucket: &str) -> Result<StorageResponse, C::Error> {
        helpers::create_snapshot_bucket(self, bucket).await
    }

    /// See [`helpers::create_snapshot`].
    pub async fn create_snapshot(
        &self,
        bucket: &str,
        name: Option<&str>,
    ) -> Result<StorageResponse, C::Error> {
        helpers::create_snapshot(self, bucket, name).await
    }

    /// See [`helpers::list_snapshots`].
    pub async fn list_snapshots(&self, bucket: &str) -> Result<StorageResponse, C::Error> {
        helpers::list_snapshots(self, bucket).await
    }

    /// See [`helpers::create_fork`].
    pub async fn create_fork(
        &self,
        bucket: &str,
        source: &str,
        version: Option<&str>,
    ) -> Result<StorageResponse, C::Error> {
        helpers::create_fork(self, bucket, source, version).await
    }

    /// See [`helpers::get_object_from_snapshot`].
    pub async fn get_object_from_snapshot(
        &self,
        bucket: &str,
        key: &str,
        version: &str,
    ) -> Result<StorageResponse, C::Error> {
        helpers::get_object_from_snapshot(self, bucket, key, version).await
    }

    /// See [`helpers::list_objects_from_snapshot`].
    pub async fn list_objects_from_snapshot(
        &self,
        bucket: &str,
        version: &str,
        prefix: Option<&str>,
    ) -> Result<StorageResponse, C::Error> {
        helpers::list_objects_from_snapshot(self, bucket, version, prefix).await
    }

    /// See [`helpers::head_object_from_snapshot`].
    pub async fn head_object_from_snapshot(
        &self,
        bucket: &str,
        key: &str,
        version: &str,
    ) -> Result<StorageResponse, C::Error> {
        helpers::head_object_from_snapshot(self, bucket, key, version).await
    }

    /// See [`helpers::has_snapshot_enabled`].
    pub async fn has_snapshot_enabled(&self, bucket: &str) -> Result<bool, C::Error> {
        helpers::has_snapshot_enabled(self, bucket).await
    }

    /// See [`helpers::get_bucket_info`].
    pub async fn get_bucket_info(&self, bucket: &str) -> Result<BucketDetails, C::Error> {
        helpers::get_bucket_info(self, bucket).await
    }
}

#[async_trait::async_trait]
impl<C: StorageClient> StorageClient for TigrisClient<C> {
    type Error = C::Error;

    fn hooks(&self) -> &HookRegistry {
        self.inner.hooks()
    }

    async fn send(&self, request: StorageRequest) -> Result<StorageResponse, C::Error> {
        self.inner.send(request).await
    }

    async fn dispatch(&self, request: StorageRequest) -> Result<StorageResponse, C::Error> {
        self.inner.dispatch(request).await
    }
}

impl<C> Deref for TigrisClient<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.inner
    }
}

impl<C: StorageClient> From<C> for TigrisClient<C> {
    fn from(inner: C) -> Self {
        Self::new(inner)
    }
}
