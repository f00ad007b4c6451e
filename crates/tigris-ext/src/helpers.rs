//! One-shot helpers for Tigris snapshots and forks.
//!
//! Each helper enters a scope, performs exactly one storage operation, and
//! leaves the scope again. The operation's response or error is returned
//! unchanged; the scope is left even if the returned future is dropped
//! before it completes. Helpers run in their own context, so several of them
//! can be joined in one task without seeing each other's scopes.

use std::fmt::Display;

use tigris_core::{BucketInfo, StorageClient, StorageResponse, codec};
use tracing::instrument;

use crate::{TRACING_TARGET_HELPERS, scope};

/// Tigris metadata of a bucket together with the raw `HeadBucket` response.
#[derive(Debug, Clone)]
pub struct BucketDetails {
    /// Decoded Tigris metadata.
    pub info: BucketInfo,
    /// The full response the metadata was decoded from.
    pub response: StorageResponse,
}

impl BucketDetails {
    /// Returns whether the bucket has snapshots enabled.
    pub fn snapshot_enabled(&self) -> bool {
        self.info.snapshot_enabled
    }

    /// Returns whether the bucket is a fork.
    pub fn is_fork(&self) -> bool {
        self.info.is_fork()
    }
}

/// Creates a bucket with snapshots enabled.
///
/// # Errors
///
/// Returns the client's error if bucket creation fails.
#[instrument(skip(client), target = TRACING_TARGET_HELPERS)]
pub async fn create_snapshot_bucket<C>(
    client: &C,
    bucket: &str,
) -> Result<StorageResponse, C::Error>
where
    C: StorageClient + ?Sized,
{
    scope::isolate(async {
        let _scope = scope::enable_snapshot(client);
        traced("create_snapshot_bucket", client.create_bucket(bucket).await)
    })
    .await
}

/// Takes a snapshot of `bucket`, optionally named.
///
/// The version of the new snapshot is available through
/// [`snapshot_version`] on the returned response.
///
/// # Errors
///
/// Returns an invalid-descriptor error for empty or malformed arguments, or
/// the client's error if the request fails.
#[instrument(skip(client), target = TRACING_TARGET_HELPERS)]
pub async fn create_snapshot<C>(
    client: &C,
    bucket: &str,
    name: Option<&str>,
) -> Result<StorageResponse, C::Error>
where
    C: StorageClient + ?Sized,
{
    scope::isolate(async {
        let _scope = scope::create_snapshot(client, bucket, name)?;
        traced("create_snapshot", client.create_bucket(bucket).await)
    })
    .await
}

/// Lists the snapshots of `bucket`.
///
/// # Errors
///
/// Returns an invalid-descriptor error for an empty bucket name, or the
/// client's error if the request fails.
#[instrument(skip(client), target = TRACING_TARGET_HELPERS)]
pub async fn list_snapshots<C>(client: &C, bucket: &str) -> Result<StorageResponse, C::Error>
where
    C: StorageClient + ?Sized,
{
    scope::isolate(async {
        let _scope = scope::select_snapshot(client, bucket, None)?;
        traced("list_snapshots", client.list_buckets().await)
    })
    .await
}

/// Creates `bucket` as a fork of `source`, optionally pinned to a snapshot.
///
/// # Errors
///
/// Returns an invalid-descriptor error for empty or malformed arguments, or
/// the client's error if bucket creation fails.
#[instrument(skip(client), target = TRACING_TARGET_HELPERS)]
pub async fn create_fork<C>(
    client: &C,
    bucket: &str,
    source: &str,
    version: Option<&str>,
) -> Result<StorageResponse, C::Error>
where
    C: StorageClient + ?Sized,
{
    scope::isolate(async {
        let _scope = scope::declare_fork(client, source, version)?;
        traced("create_fork", client.create_bucket(bucket).await)
    })
    .await
}

/// Reads an object as it was in snapshot `version`.
///
/// # Errors
///
/// Returns an invalid-descriptor error for empty or malformed arguments, or
/// the client's error if the request fails.
#[instrument(skip(client), target = TRACING_TARGET_HELPERS)]
pub async fn get_object_from_snapshot<C>(
    client: &C,
    bucket: &str,
    key: &str,
    version: &str,
) -> Result<StorageResponse, C::Error>
where
    C: StorageClient + ?Sized,
{
    scope::isolate(async {
        let _scope = scope::select_snapshot(client, bucket, Some(version))?;
        traced(
            "get_object_from_snapshot",
            client.get_object(bucket, key).await,
        )
    })
    .await
}

/// Lists objects as they were in snapshot `version`.
///
/// # Errors
///
/// Returns an invalid-descriptor error for empty or malformed arguments, or
/// the client's error if the request fails.
#[instrument(skip(client), target = TRACING_TARGET_HELPERS)]
pub async fn list_objects_from_snapshot<C>(
    client: &C,
    bucket: &str,
    version: &str,
    prefix: Option<&str>,
) -> Result<StorageResponse, C::Error>
where
    C: StorageClient + ?Sized,
{
    scope::isolate(async {
        let _scope = scope::select_snapshot(client, bucket, Some(version))?;
        traced(
            "list_objects_from_snapshot",
            client.list_objects(bucket, prefix).await,
        )
    })
    .await
}

/// Fetches object metadata as it was in snapshot `version`.
///
/// # Errors
///
/// Returns an invalid-descriptor error for empty or malformed arguments, or
/// the client's error if the request fails.
#[instrument(skip(client), target = TRACING_TARGET_HELPERS)]
pub async fn head_object_from_snapshot<C>(
    client: &C,
    bucket: &str,
    key: &str,
    version: &str,
) -> Result<StorageResponse, C::Error>
where
    C: StorageClient + ?Sized,
{
    scope::isolate(async {
        let _scope = scope::select_snapshot(client, bucket, Some(version))?;
        traced(
            "head_object_from_snapshot",
            client.head_object(bucket, key).await,
        )
    })
    .await
}

/// Returns whether `bucket` has snapshots enabled.
///
/// # Errors
///
/// Returns the client's error if `HeadBucket` fails.
#[instrument(skip(client), target = TRACING_TARGET_HELPERS)]
pub async fn has_snapshot_enabled<C>(client: &C, bucket: &str) -> Result<bool, C::Error>
where
    C: StorageClient + ?Sized,
{
    let response = traced("has_snapshot_enabled", client.head_bucket(bucket).await)?;
    Ok(codec::is_snapshot_enabled(&response.headers))
}

/// Fetches the Tigris metadata of `bucket`.
///
/// # Errors
///
/// Returns the client's error if `HeadBucket` fails.
#[instrument(skip(client), target = TRACING_TARGET_HELPERS)]
pub async fn get_bucket_info<C>(client: &C, bucket: &str) -> Result<BucketDetails, C::Error>
where
    C: StorageClient + ?Sized,
{
    let response = traced("get_bucket_info", client.head_bucket(bucket).await)?;
    Ok(BucketDetails {
        info: response.bucket_info(),
        response,
    })
}

/// Returns the version announced by a [`create_snapshot`] response.
pub fn snapshot_version(response: &StorageResponse) -> Option<String> {
    response.snapshot_version()
}

fn traced<T, E: Display>(operation: &'static str, result: Result<T, E>) -> Result<T, E> {
    match &result {
        Ok(_) => tracing::debug!(
            target: TRACING_TARGET_HELPERS,
            operation,
            "Helper completed"
        ),
        Err(err) => tracing::error!(
            target: TRACING_TARGET_HELPERS,
            operation,
            error = %err,
            "Helper failed"
        ),
    }
    result
}
