//! Error types for the validation hook

use thiserror::Error;

/// Result type alias for hook operations
pub type Result<T> = std::result::Result<T, HookError>;

/// Everything that can go wrong inside a hook execution
///
/// Every variant folds into a reported `Failed` status; only
/// [`HookError::Report`] escapes the hook, because nothing else can be told.
#[derive(Debug, Error)]
pub enum HookError {
    /// The revision under test could not be invoked or answered non-success
    #[error("synthetic invoke failed: {0}")]
    Invoke(String),

    /// The consistency read found no record after the propagation wait
    #[error("record '{key}' not found in table '{table}' after propagation wait")]
    ReadMiss { table: String, key: String },

    /// The record store could not be queried
    #[error("record store error: {0}")]
    Store(String),

    /// The status report could not be delivered
    #[error("failed to report hook status: {0}")]
    Report(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}
