#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for scope guards and decorators.
pub const TRACING_TARGET_SCOPE: &str = "tigris_ext::scope";

/// Tracing target for the one-shot helpers.
pub const TRACING_TARGET_HELPERS: &str = "tigris_ext::helpers";

/// Tracing target for the client façade.
pub const TRACING_TARGET_CLIENT: &str = "tigris_ext::client";

mod client;
pub mod decorate;
pub mod helpers;
pub mod scope;

#[doc(hidden)]
pub mod prelude;

pub use tigris_core::{
    BucketInfo, Error, ErrorKind, HookConfig, Operation, Result, ScopeDescriptor, StorageClient,
    StorageRequest, StorageResponse,
};

pub use crate::client::TigrisClient;
pub use crate::decorate::{Decorated, ScopeDecorator};
pub use crate::helpers::BucketDetails;
pub use crate::scope::ScopeGuard;
