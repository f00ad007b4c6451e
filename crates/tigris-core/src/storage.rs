//! Contract of the underlying object-storage client.
//!
//! The scope machinery never talks to the network itself. It relies on a
//! [`StorageClient`] that owns a [`HookRegistry`] and runs it on every request
//! right before the request is signed and sent.

use std::collections::BTreeMap;

use bytes::Bytes;
use http::header::IntoHeaderName;
use http::{HeaderMap, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};

use crate::codec::{self, BucketInfo};
use crate::{Error, HookRegistry};

/// S3 operations that can carry scope headers.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[cfg_attr(feature = "config", derive(clap::ValueEnum))]
pub enum Operation {
    /// `CreateBucket`.
    CreateBucket,
    /// `DeleteBucket`.
    DeleteBucket,
    /// `HeadBucket`.
    HeadBucket,
    /// `ListBuckets`.
    ListBuckets,
    /// `PutObject`.
    PutObject,
    /// `GetObject`.
    GetObject,
    /// `HeadObject`.
    HeadObject,
    /// `ListObjectsV2`.
    ListObjects,
    /// `DeleteObject`.
    DeleteObject,
}

/// An outgoing request before it is signed.
#[derive(Debug, Clone)]
pub struct StorageRequest {
    /// The operation being performed.
    pub operation: Operation,
    /// Target bucket, absent for `ListBuckets`.
    pub bucket: Option<String>,
    /// Target object key.
    pub key: Option<String>,
    /// Query parameters such as `prefix`.
    pub params: BTreeMap<String, String>,
    /// Request headers; the scope injector writes here.
    pub headers: HeaderMap,
    /// Request payload.
    pub body: Bytes,
}

impl StorageRequest {
    /// Creates an empty request for an operation.
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            bucket: None,
            key: None,
            params: BTreeMap::new(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Sets the target bucket.
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Sets the target object key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Adds a query parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Sets a request header.
    pub fn with_header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the payload.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// A response as delivered by the underlying client.
#[derive(Debug, Clone)]
pub struct StorageResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response payload.
    pub body: Bytes,
}

impl StorageResponse {
    /// Creates an empty response with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Creates an empty `200 OK` response.
    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    /// Sets a response header.
    pub fn with_header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the payload.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Decodes the Tigris bucket metadata carried by this response.
    pub fn bucket_info(&self) -> BucketInfo {
        codec::decode_response(&self.headers)
    }

    /// Returns the snapshot version announced by a create-snapshot response.
    pub fn snapshot_version(&self) -> Option<String> {
        codec::snapshot_version(&self.headers)
    }
}

/// An object-storage client with a pre-send extension point.
///
/// Implementors provide [`hooks`](Self::hooks) and the raw [`send`](Self::send);
/// every provided operation goes through [`dispatch`](Self::dispatch), which
/// runs the attached scope injector exactly once before handing the request over.
///
/// Errors of the underlying transport are returned untouched. Errors raised by
/// the injector are converted into [`Self::Error`] and the request is not sent.
#[async_trait::async_trait]
pub trait StorageClient: Send + Sync {
    /// Error type of the underlying client.
    type Error: std::error::Error + From<Error> + Send + Sync + 'static;

    /// Returns the hook registry owned by this client instance.
    fn hooks(&self) -> &HookRegistry;

    /// Signs and sends a request without running the injector.
    async fn send(&self, request: StorageRequest) -> Result<StorageResponse, Self::Error>;

    /// Runs the scope injector, then sends the request.
    async fn dispatch(&self, mut request: StorageRequest) -> Result<StorageResponse, Self::Error> {
        self.hooks().before_send(&mut request)?;
        self.send(request).await
    }

    /// Creates a bucket.
    async fn create_bucket(&self, bucket: &str) -> Result<StorageResponse, Self::Error> {
        let request = StorageRequest::new(Operation::CreateBucket).with_bucket(bucket);
        self.dispatch(request).await
    }

    /// Deletes a bucket.
    async fn delete_bucket(&self, bucket: &str) -> Result<StorageResponse, Self::Error> {
        let request = StorageRequest::new(Operation::DeleteBucket).with_bucket(bucket);
        self.dispatch(request).await
    }

    /// Fetches bucket metadata.
    async fn head_bucket(&self, bucket: &str) -> Result<StorageResponse, Self::Error> {
        let request = StorageRequest::new(Operation::HeadBucket).with_bucket(bucket);
        self.dispatch(request).await
    }

    /// Lists buckets, or snapshots of a bucket inside a list scope.
    async fn list_buckets(&self) -> Result<StorageResponse, Self::Error> {
        self.dispatch(StorageRequest::new(Operation::ListBuckets)).await
    }

    /// Uploads an object.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
    ) -> Result<StorageResponse, Self::Error> {
        let request = StorageRequest::new(Operation::PutObject)
            .with_bucket(bucket)
            .with_key(key)
            .with_body(body);
        self.dispatch(request).await
    }

    /// Downloads an object.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<StorageResponse, Self::Error> {
        let request = StorageRequest::new(Operation::GetObject)
            .with_bucket(bucket)
            .with_key(key);
        self.dispatch(request).await
    }

    /// Fetches object metadata.
    async fn head_object(&self, bucket: &str, key: &str) -> Result<StorageResponse, Self::Error> {
        let request = StorageRequest::new(Operation::HeadObject)
            .with_bucket(bucket)
            .with_key(key);
        self.dispatch(request).await
    }

    /// Lists objects, optionally under a prefix.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> Result<StorageResponse, Self::Error> {
        let mut request = StorageRequest::new(Operation::ListObjects).with_bucket(bucket);
        if let Some(prefix) = prefix {
            request = request.with_param("prefix", prefix);
        }
        self.dispatch(request).await
    }

    /// Deletes an object.
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<StorageResponse, Self::Error> {
        let request = StorageRequest::new(Operation::DeleteObject)
            .with_bucket(bucket)
            .with_key(key);
        self.dispatch(request).await
    }
}
