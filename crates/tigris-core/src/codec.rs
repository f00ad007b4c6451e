//! Encoding scope descriptors into request headers and decoding Tigris
//! response headers.
//!
//! Both directions are pure functions. Each scope only annotates the operations
//! its headers mean something to; see [`operations`]. Request header names are emitted in
//! their canonical mixed-case spelling; response headers are looked up
//! case-insensitively through [`http::HeaderMap`].

use std::collections::BTreeMap;

use http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::{Operation, ScopeDescriptor, ScopeKind, SnapshotIntent};

/// Enables snapshots on bucket creation; echoed back by `HeadBucket`.
pub const ENABLE_SNAPSHOT: &str = "X-Tigris-Enable-Snapshot";

/// Creates a snapshot (`true`, `true; name=<name>`) or lists snapshots (`<bucket>`).
pub const SNAPSHOT: &str = "X-Tigris-Snapshot";

/// Selects a snapshot version for reads; returned by snapshot creation.
pub const SNAPSHOT_VERSION: &str = "X-Tigris-Snapshot-Version";

/// Names the parent of a forked bucket.
pub const FORK_SOURCE_BUCKET: &str = "X-Tigris-Fork-Source-Bucket";

/// Pins a fork to a snapshot version of its parent.
pub const FORK_SOURCE_BUCKET_SNAPSHOT: &str = "X-Tigris-Fork-Source-Bucket-Snapshot";

/// Header names mapped to values, ordered by name.
pub type HeaderSet = BTreeMap<&'static str, String>;

/// Tigris-specific metadata decoded from bucket response headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    /// Whether the bucket has snapshots enabled.
    pub snapshot_enabled: bool,
    /// The parent bucket, when this bucket is a fork.
    pub fork_source_bucket: Option<String>,
    /// The parent snapshot version, when the fork was pinned to one.
    pub fork_source_snapshot: Option<String>,
}

impl BucketInfo {
    /// Returns whether the bucket is a fork of another bucket.
    pub fn is_fork(&self) -> bool {
        self.fork_source_bucket.is_some()
    }
}

/// Encodes a descriptor into the headers it contributes.
pub fn encode(descriptor: &ScopeDescriptor) -> HeaderSet {
    let mut headers = HeaderSet::new();
    encode_into(descriptor, &mut headers);
    headers
}

/// Encodes a descriptor into an existing set, overwriting keys it produces.
pub fn encode_into(descriptor: &ScopeDescriptor, headers: &mut HeaderSet) {
    match descriptor.kind() {
        ScopeKind::SnapshotEnable => {
            headers.insert(ENABLE_SNAPSHOT, "true".to_owned());
        }
        ScopeKind::SnapshotSelect => match descriptor.intent() {
            Some(SnapshotIntent::Create) => {
                let value = match descriptor.snapshot_name() {
                    Some(name) => format!("true; name={name}"),
                    None => "true".to_owned(),
                };
                headers.insert(SNAPSHOT, value);
            }
            Some(SnapshotIntent::Read) => {
                if let Some(version) = descriptor.snapshot_version() {
                    headers.insert(SNAPSHOT_VERSION, version.to_owned());
                }
            }
            Some(SnapshotIntent::List) | None => {
                if let Some(bucket) = descriptor.bucket() {
                    headers.insert(SNAPSHOT, bucket.to_owned());
                }
            }
        },
        ScopeKind::ForkDeclare => {
            if let Some(source) = descriptor.fork_source_bucket() {
                headers.insert(FORK_SOURCE_BUCKET, source.to_owned());
            }
            if let Some(version) = descriptor.snapshot_version() {
                headers.insert(FORK_SOURCE_BUCKET_SNAPSHOT, version.to_owned());
            }
        }
    }
}

/// Returns the operations a descriptor's headers are sent with.
pub fn operations(descriptor: &ScopeDescriptor) -> &'static [Operation] {
    match (descriptor.kind(), descriptor.intent()) {
        (ScopeKind::SnapshotEnable | ScopeKind::ForkDeclare, _) => &[Operation::CreateBucket],
        (ScopeKind::SnapshotSelect, Some(SnapshotIntent::Create)) => &[Operation::CreateBucket],
        (ScopeKind::SnapshotSelect, Some(SnapshotIntent::Read)) => &[
            Operation::ListBuckets,
            Operation::GetObject,
            Operation::HeadObject,
            Operation::ListObjects,
        ],
        (ScopeKind::SnapshotSelect, Some(SnapshotIntent::List) | None) => {
            &[Operation::ListBuckets]
        }
    }
}

/// Encodes the headers a descriptor contributes to one operation.
///
/// A read scope lists the snapshots of its bucket on `ListBuckets` and sends
/// the snapshot version on object reads.
pub fn encode_for(descriptor: &ScopeDescriptor, operation: Operation, headers: &mut HeaderSet) {
    if !operations(descriptor).contains(&operation) {
        return;
    }

    match (descriptor.intent(), operation) {
        (Some(SnapshotIntent::Read), Operation::ListBuckets) => {
            if let Some(bucket) = descriptor.bucket() {
                headers.insert(SNAPSHOT, bucket.to_owned());
            }
        }
        _ => encode_into(descriptor, headers),
    }
}

/// Merges the headers descriptors contribute to one operation, outermost first.
pub fn merge_for<'a>(
    descriptors: impl IntoIterator<Item = &'a ScopeDescriptor>,
    operation: Operation,
) -> HeaderSet {
    let mut headers = HeaderSet::new();
    for descriptor in descriptors {
        encode_for(descriptor, operation, &mut headers);
    }
    headers
}

/// Merges descriptors outermost first; for a shared key the last one wins.
pub fn merge<'a>(descriptors: impl IntoIterator<Item = &'a ScopeDescriptor>) -> HeaderSet {
    let mut headers = HeaderSet::new();
    for descriptor in descriptors {
        encode_into(descriptor, &mut headers);
    }
    headers
}

/// Decodes Tigris bucket metadata from response headers.
///
/// Missing headers are not an error: they decode to `false` / `None`.
pub fn decode_response(headers: &HeaderMap) -> BucketInfo {
    BucketInfo {
        snapshot_enabled: is_snapshot_enabled(headers),
        fork_source_bucket: header_string(headers, FORK_SOURCE_BUCKET),
        fork_source_snapshot: header_string(headers, FORK_SOURCE_BUCKET_SNAPSHOT),
    }
}

/// Returns whether `X-Tigris-Enable-Snapshot` is `true`, ignoring case.
pub fn is_snapshot_enabled(headers: &HeaderMap) -> bool {
    header_str(headers, ENABLE_SNAPSHOT).is_some_and(|value| value.eq_ignore_ascii_case("true"))
}

/// Extracts the version of a freshly created snapshot.
pub fn snapshot_version(headers: &HeaderMap) -> Option<String> {
    header_string(headers, SNAPSHOT_VERSION)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    header_str(headers, name)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}
