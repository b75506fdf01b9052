//! Error types for the shard pipeline.

use crate::types::TransactionId;
use thiserror::Error;
use trellis_tree::{TreeError, TreePath};

/// Result type for shard operations.
pub type ShardResult<T> = Result<T, ShardError>;

/// Errors that can occur in the shard commit pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShardError {
    /// The candidate's preconditions no longer hold against tentative state.
    #[error("validation conflict at {path}")]
    ValidationConflict {
        /// The conflicting path.
        path: TreePath,
    },

    /// A successor could not be re-validated after a predecessor's abort.
    #[error("rebase failed at {path} after predecessor abort")]
    RebaseFailed {
        /// The path that failed re-validation.
        path: TreePath,
    },

    /// The durable append was rejected by the replication boundary.
    #[error("replication append failed: {message}")]
    ReplicationFailed {
        /// Description of the failure.
        message: String,
    },

    /// The transaction was aborted before reaching this phase.
    #[error("transaction {id} aborted")]
    Aborted {
        /// The aborted transaction.
        id: TransactionId,
    },

    /// A phase was entered out of order; a programming-contract violation.
    #[error("transaction {id} is not in phase {expected}")]
    InvalidPhase {
        /// The offending transaction.
        id: TransactionId,
        /// The phase the pipeline expected it to be in.
        expected: &'static str,
    },

    /// The pipeline has no record of the transaction.
    #[error("unknown transaction {id}")]
    UnknownTransaction {
        /// The unknown transaction.
        id: TransactionId,
    },

    /// The pending chain reached an impossible state; a fatal protocol bug.
    #[error("pending chain corrupted: {message}")]
    ChainCorrupted {
        /// Description of the corruption.
        message: String,
    },

    /// The pending chain is at capacity.
    #[error("pending chain is full ({limit} transactions)")]
    PipelineFull {
        /// Configured chain capacity.
        limit: usize,
    },

    /// A snapshot cannot be installed while transactions are pending.
    #[error("cannot install snapshot with {pending} transactions pending")]
    ChainNotEmpty {
        /// Number of pending transactions.
        pending: usize,
    },

    /// The commit payload could not be encoded or decoded.
    #[error("payload codec error: {message}")]
    PayloadCodec {
        /// Description of the failure.
        message: String,
    },

    /// Tree-level error.
    #[error(transparent)]
    Tree(#[from] TreeError),
}

impl ShardError {
    /// Creates a validation-conflict error.
    pub fn validation_conflict(path: TreePath) -> Self {
        Self::ValidationConflict { path }
    }

    /// Creates a rebase-failure error.
    pub fn rebase_failed(path: TreePath) -> Self {
        Self::RebaseFailed { path }
    }

    /// Creates a replication-failure error.
    pub fn replication_failed(message: impl Into<String>) -> Self {
        Self::ReplicationFailed {
            message: message.into(),
        }
    }

    /// Creates a chain-corruption error.
    pub fn chain_corrupted(message: impl Into<String>) -> Self {
        Self::ChainCorrupted {
            message: message.into(),
        }
    }

    /// Creates a payload-codec error.
    pub fn payload_codec(message: impl Into<String>) -> Self {
        Self::PayloadCodec {
            message: message.into(),
        }
    }
}
