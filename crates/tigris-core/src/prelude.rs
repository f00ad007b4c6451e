//! Convenient re-exports for common use.

pub use crate::codec::{BucketInfo, HeaderSet};
pub use crate::error::{BoxedError, Error, ErrorKind, Result};
pub use crate::{
    HookConfig, HookRegistry, Operation, ScopeDescriptor, ScopeKind, ScopeStacks,
    ScopeToken, SnapshotIntent, StorageClient, StorageRequest, StorageResponse, attach, isolate,
};
