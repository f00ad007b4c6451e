#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for scope stack push/pop and header merging.
pub const TRACING_TARGET_STACK: &str = "tigris_core::stack";

/// Tracing target for hook attachment and header injection.
pub const TRACING_TARGET_HOOKS: &str = "tigris_core::hooks";

pub mod codec;
mod config;
mod context;
mod descriptor;
mod error;
mod hooks;
mod stack;
mod storage;

#[cfg(any(test, feature = "test-utils"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-utils")))]
pub mod mock;

#[doc(hidden)]
pub mod prelude;

pub use crate::codec::{BucketInfo, HeaderSet};
pub use crate::config::HookConfig;
pub use crate::context::{ContextId, isolate};
pub use crate::descriptor::{ScopeDescriptor, ScopeKind, SnapshotIntent};
pub use crate::error::{BoxedError, Error, ErrorKind, Result};
pub use crate::hooks::{HookRegistry, ScopeInjector, attach};
pub use crate::stack::{ScopeStacks, ScopeToken};
pub use crate::storage::{Operation, StorageClient, StorageRequest, StorageResponse};
