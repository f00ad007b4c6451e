//! Immutable descriptions of a single header-injection intent.

use std::fmt;

use http::HeaderValue;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, IntoStaticStr};

use crate::{Error, Result};

/// Which family of Tigris headers a scope contributes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    /// Enable snapshotting on the bucket being created.
    SnapshotEnable,
    /// Create, list, or read a snapshot.
    SnapshotSelect,
    /// Declare the bucket being created as a fork of another bucket.
    ForkDeclare,
}

/// What a [`ScopeKind::SnapshotSelect`] scope asks the service to do.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SnapshotIntent {
    /// Take a new snapshot, optionally named.
    Create,
    /// List the snapshots of a bucket.
    List,
    /// Read objects as of a snapshot version.
    Read,
}

/// An immutable description of one scope.
///
/// Only the fields that are meaningful for the descriptor's [`ScopeKind`] are
/// ever populated; every constructor validates this and rejects malformed
/// combinations with [`ErrorKind::InvalidDescriptor`](crate::ErrorKind).
///
/// # Examples
///
/// ```rust
/// use tigris_core::{ScopeDescriptor, ScopeKind};
///
/// let fork = ScopeDescriptor::fork("prod", Some("12345")).unwrap();
/// assert_eq!(fork.kind(), ScopeKind::ForkDeclare);
/// assert_eq!(fork.fork_source_bucket(), Some("prod"));
///
/// let invalid = ScopeDescriptor::builder(ScopeKind::ForkDeclare).build();
/// assert!(invalid.is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeDescriptor {
    kind: ScopeKind,
    intent: Option<SnapshotIntent>,
    bucket: Option<String>,
    snapshot_name: Option<String>,
    snapshot_version: Option<String>,
    fork_source_bucket: Option<String>,
}

impl ScopeDescriptor {
    /// Returns a builder for a descriptor of the given kind.
    pub fn builder(kind: ScopeKind) -> ScopeDescriptorBuilder {
        ScopeDescriptorBuilder::new(kind)
    }

    /// Enables snapshots on any bucket created while the scope is active.
    pub fn snapshot_enable() -> Self {
        Self {
            kind: ScopeKind::SnapshotEnable,
            intent: None,
            bucket: None,
            snapshot_name: None,
            snapshot_version: None,
            fork_source_bucket: None,
        }
    }

    /// Enables snapshots, routed to a specific bucket.
    pub fn snapshot_enable_for(bucket: impl Into<String>) -> Result<Self> {
        Self::builder(ScopeKind::SnapshotEnable)
            .bucket(bucket)
            .build()
    }

    /// Takes a snapshot of `bucket`, optionally naming it.
    pub fn snapshot_create(bucket: impl Into<String>, name: Option<&str>) -> Result<Self> {
        let mut builder = Self::builder(ScopeKind::SnapshotSelect)
            .intent(SnapshotIntent::Create)
            .bucket(bucket);
        if let Some(name) = name {
            builder = builder.snapshot_name(name);
        }
        builder.build()
    }

    /// Lists the snapshots of `bucket`.
    pub fn snapshot_list(bucket: impl Into<String>) -> Result<Self> {
        Self::builder(ScopeKind::SnapshotSelect)
            .intent(SnapshotIntent::List)
            .bucket(bucket)
            .build()
    }

    /// Reads `bucket` as of `version`.
    pub fn snapshot_read(bucket: impl Into<String>, version: impl Into<String>) -> Result<Self> {
        Self::builder(ScopeKind::SnapshotSelect)
            .intent(SnapshotIntent::Read)
            .bucket(bucket)
            .snapshot_version(version)
            .build()
    }

    /// Lists snapshots when `version` is `None`, reads from the snapshot otherwise.
    pub fn snapshot_select(bucket: impl Into<String>, version: Option<&str>) -> Result<Self> {
        match version {
            Some(version) => Self::snapshot_read(bucket, version),
            None => Self::snapshot_list(bucket),
        }
    }

    /// Declares buckets created in scope as forks of `source`, optionally
    /// pinned to a snapshot version.
    pub fn fork(source: impl Into<String>, version: Option<&str>) -> Result<Self> {
        let mut builder = Self::builder(ScopeKind::ForkDeclare).fork_source_bucket(source);
        if let Some(version) = version {
            builder = builder.snapshot_version(version);
        }
        builder.build()
    }

    /// Returns the descriptor kind.
    #[inline]
    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    /// Returns the snapshot intent; only set for [`ScopeKind::SnapshotSelect`].
    #[inline]
    pub fn intent(&self) -> Option<SnapshotIntent> {
        self.intent
    }

    /// Returns the bucket this scope is routed to.
    #[inline]
    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref()
    }

    /// Returns whether this scope applies to a request on `bucket`.
    ///
    /// Scopes without a bucket apply everywhere, as do requests that do not
    /// target a bucket.
    pub fn routes_to(&self, bucket: Option<&str>) -> bool {
        match (self.bucket(), bucket) {
            (Some(own), Some(requested)) => own == requested,
            _ => true,
        }
    }

    /// Returns the name of the snapshot to create.
    #[inline]
    pub fn snapshot_name(&self) -> Option<&str> {
        self.snapshot_name.as_deref()
    }

    /// Returns the snapshot version to read from or fork at.
    #[inline]
    pub fn snapshot_version(&self) -> Option<&str> {
        self.snapshot_version.as_deref()
    }

    /// Returns the bucket a fork is derived from.
    #[inline]
    pub fn fork_source_bucket(&self) -> Option<&str> {
        self.fork_source_bucket.as_deref()
    }
}

impl fmt::Display for ScopeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(intent) = self.intent {
            write!(f, "({intent})")?;
        }
        if let Some(bucket) = &self.bucket {
            write!(f, " bucket={bucket}")?;
        }
        if let Some(source) = &self.fork_source_bucket {
            write!(f, " source={source}")?;
        }
        if let Some(name) = &self.snapshot_name {
            write!(f, " name={name}")?;
        }
        if let Some(version) = &self.snapshot_version {
            write!(f, " version={version}")?;
        }
        Ok(())
    }
}

/// Builder that validates field combinations against the descriptor kind.
#[derive(Debug, Clone)]
#[must_use = "builders do nothing unless `build` is called"]
pub struct ScopeDescriptorBuilder {
    kind: ScopeKind,
    intent: Option<SnapshotIntent>,
    bucket: Option<String>,
    snapshot_name: Option<String>,
    snapshot_version: Option<String>,
    fork_source_bucket: Option<String>,
}

impl ScopeDescriptorBuilder {
    fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            intent: None,
            bucket: None,
            snapshot_name: None,
            snapshot_version: None,
            fork_source_bucket: None,
        }
    }

    /// Sets an explicit snapshot intent instead of inferring it.
    pub fn intent(mut self, intent: SnapshotIntent) -> Self {
        self.intent = Some(intent);
        self
    }

    /// Sets the target bucket.
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Sets the name of the snapshot to create.
    pub fn snapshot_name(mut self, name: impl Into<String>) -> Self {
        self.snapshot_name = Some(name.into());
        self
    }

    /// Sets the snapshot version.
    pub fn snapshot_version(mut self, version: impl Into<String>) -> Self {
        self.snapshot_version = Some(version.into());
        self
    }

    /// Sets the fork source bucket.
    pub fn fork_source_bucket(mut self, source: impl Into<String>) -> Self {
        self.fork_source_bucket = Some(source.into());
        self
    }

    /// Validates the fields and builds the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidDescriptor`](crate::ErrorKind) when a field is
    /// empty, is not a valid header value, or does not belong to the kind.
    pub fn build(self) -> Result<ScopeDescriptor> {
        validate_field("bucket", self.bucket.as_deref())?;
        validate_field("snapshot_name", self.snapshot_name.as_deref())?;
        validate_field("snapshot_version", self.snapshot_version.as_deref())?;
        validate_field("fork_source_bucket", self.fork_source_bucket.as_deref())?;

        let intent = match self.kind {
            ScopeKind::SnapshotEnable => {
                self.reject(self.intent.is_some(), "snapshot intent")?;
                self.reject(self.snapshot_name.is_some(), "snapshot_name")?;
                self.reject(self.snapshot_version.is_some(), "snapshot_version")?;
                self.reject(self.fork_source_bucket.is_some(), "fork_source_bucket")?;
                None
            }
            ScopeKind::SnapshotSelect => {
                self.reject(self.fork_source_bucket.is_some(), "fork_source_bucket")?;
                Some(self.snapshot_intent()?)
            }
            ScopeKind::ForkDeclare => {
                self.reject(self.intent.is_some(), "snapshot intent")?;
                self.reject(self.snapshot_name.is_some(), "snapshot_name")?;
                if self.fork_source_bucket.is_none() {
                    return Err(Error::invalid_descriptor()
                        .with_message("fork_declare requires fork_source_bucket"));
                }
                None
            }
        };

        Ok(ScopeDescriptor {
            kind: self.kind,
            intent,
            bucket: self.bucket,
            snapshot_name: self.snapshot_name,
            snapshot_version: self.snapshot_version,
            fork_source_bucket: self.fork_source_bucket,
        })
    }

    /// Resolves the snapshot intent, inferring it from the populated fields
    /// when none was set explicitly.
    fn snapshot_intent(&self) -> Result<SnapshotIntent> {
        let has_name = self.snapshot_name.is_some();
        let has_version = self.snapshot_version.is_some();

        if has_name && has_version {
            return Err(Error::invalid_descriptor()
                .with_message("snapshot_name and snapshot_version are mutually exclusive"));
        }

        let intent = match self.intent {
            Some(intent) => intent,
            None if has_name => SnapshotIntent::Create,
            None if has_version => SnapshotIntent::Read,
            None => SnapshotIntent::List,
        };

        match intent {
            SnapshotIntent::Create => {
                self.reject(has_version, "snapshot_version")?;
            }
            SnapshotIntent::List => {
                self.reject(has_name, "snapshot_name")?;
                self.reject(has_version, "snapshot_version")?;
                if self.bucket.is_none() {
                    return Err(Error::invalid_descriptor()
                        .with_message("listing snapshots requires a bucket"));
                }
            }
            SnapshotIntent::Read => {
                self.reject(has_name, "snapshot_name")?;
                if !has_version {
                    return Err(Error::invalid_descriptor()
                        .with_message("reading a snapshot requires snapshot_version"));
                }
            }
        }

        Ok(intent)
    }

    fn reject(&self, present: bool, field: &str) -> Result<()> {
        if present {
            let kind = match self.intent {
                Some(intent) => format!("{}({intent})", self.kind),
                None => self.kind.to_string(),
            };
            return Err(Error::invalid_descriptor()
                .with_message(format!("{field} is not allowed for {kind}")));
        }
        Ok(())
    }
}

fn validate_field(field: &str, value: Option<&str>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };

    if value.is_empty() {
        return Err(Error::invalid_descriptor().with_message(format!("{field} must not be empty")));
    }

    HeaderValue::from_str(value).map_err(|e| {
        Error::invalid_descriptor()
            .with_message(format!("{field} is not a valid header value"))
            .with_source(e)
    })?;

    Ok(())
}
