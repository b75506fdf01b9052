//! Shard configuration.

use crate::types::ShardId;

/// Configuration for one shard's commit pipeline.
///
/// The configuration is immutable: it is validated once at construction and
/// never re-read or re-derived afterwards.
#[derive(Debug, Clone)]
pub struct ShardConfig {
    /// Identifier of this shard.
    pub shard_id: ShardId,

    /// Human-readable shard name used in logs.
    pub name: String,

    /// Maximum number of in-flight transactions in the pending chain.
    pub max_pending_transactions: usize,
}

impl ShardConfig {
    /// Creates a configuration with default values for the given shard.
    #[must_use]
    pub fn new(shard_id: ShardId) -> Self {
        Self {
            shard_id,
            name: format!("{shard_id}"),
            max_pending_transactions: 4096,
        }
    }

    /// Sets the shard name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the pending-chain capacity.
    #[must_use]
    pub const fn max_pending_transactions(mut self, limit: usize) -> Self {
        self.max_pending_transactions = limit;
        self
    }
}
