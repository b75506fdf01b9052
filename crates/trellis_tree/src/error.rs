//! Error types for tree operations.

use thiserror::Error;

/// Result type for tree operations.
pub type TreeResult<T> = Result<T, TreeError>;

/// Errors that can occur while manipulating trees.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// The modification has been sealed and no longer accepts operations.
    #[error("modification is sealed")]
    Sealed,

    /// The operation requires a sealed modification.
    #[error("modification is not sealed")]
    NotSealed,
}
