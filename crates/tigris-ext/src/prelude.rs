//! Convenient re-exports for common use.

pub use tigris_core::prelude::*;

pub use crate::{BucketDetails, Decorated, ScopeDecorator, ScopeGuard, TigrisClient};
pub use crate::{decorate, helpers, scope};
