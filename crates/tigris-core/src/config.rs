//! Configuration of the scope header injector.

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::Operation;

/// Configuration for the pre-send hook that injects scope headers.
///
/// Each scope already limits itself to the operations its headers apply to.
/// The defaults add no further restriction and keep header values out of the
/// logs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct HookConfig {
    /// Operations allowed to receive scope headers; no restriction when unset.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "tigris-operations",
            env = "TIGRIS_OPERATIONS",
            value_delimiter = ','
        )
    )]
    #[serde(default)]
    pub operations: Option<Vec<Operation>>,

    /// Include header values in debug logs.
    #[cfg_attr(
        feature = "config",
        arg(long = "tigris-log-values", env = "TIGRIS_LOG_VALUES")
    )]
    #[serde(default)]
    pub log_values: bool,
}

impl HookConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows injection only into the given operations.
    pub fn with_operations(mut self, operations: impl IntoIterator<Item = Operation>) -> Self {
        self.operations = Some(operations.into_iter().collect());
        self
    }

    /// Enables or disables logging of header values.
    pub fn with_log_values(mut self, log_values: bool) -> Self {
        self.log_values = log_values;
        self
    }

    /// Returns whether scope headers are injected for an operation.
    pub fn applies_to(&self, operation: Operation) -> bool {
        self.operations
            .as_ref()
            .is_none_or(|operations| operations.contains(&operation))
    }
}
