//! Error types for the client frontend.

use thiserror::Error;
use trellis_shard::{ShardError, ShardId, TransactionId};

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the client frontend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The transaction was already readied or aborted.
    #[error("transaction {id} is closed")]
    Closed {
        /// The closed transaction.
        id: TransactionId,
    },

    /// The resolver routed to a shard it cannot produce.
    #[error("no shard registered for {shard}")]
    UnknownShard {
        /// The missing shard.
        shard: ShardId,
    },

    /// A participating shard rejected the operation.
    #[error(transparent)]
    Shard(#[from] ShardError),
}
