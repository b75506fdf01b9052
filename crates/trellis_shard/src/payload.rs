//! Opaque codec boundary for replication payloads and state snapshots.
//!
//! The pipeline hands the replication boundary an opaque serialization of
//! `(transaction id, candidate)` and never inspects it afterwards; replicas
//! decode it to replay the candidate. State snapshots carry a whole
//! authoritative tree for out-of-band catch-up.

use crate::error::{ShardError, ShardResult};
use crate::types::TransactionId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use trellis_tree::{Candidate, TreeNode};

#[derive(Serialize, Deserialize)]
struct PayloadBody {
    id: TransactionId,
    candidate: Candidate,
}

/// Opaque CBOR serialization of one committing transaction's candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitPayload {
    bytes: Vec<u8>,
}

impl CommitPayload {
    /// Encodes a transaction id and its candidate.
    pub fn encode(id: TransactionId, candidate: &Candidate) -> ShardResult<Self> {
        let body = PayloadBody {
            id,
            candidate: candidate.clone(),
        };
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&body, &mut bytes)
            .map_err(|e| ShardError::payload_codec(e.to_string()))?;
        Ok(Self { bytes })
    }

    /// Decodes the transaction id and candidate carried by this payload.
    pub fn decode(&self) -> ShardResult<(TransactionId, Candidate)> {
        let body: PayloadBody = ciborium::de::from_reader(self.bytes.as_slice())
            .map_err(|e| ShardError::payload_codec(e.to_string()))?;
        Ok((body.id, body.candidate))
    }

    /// Wraps raw payload bytes received from the replication boundary.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Returns the serialized bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Checks whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Opaque, self-contained serialization of a shard's authoritative state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    bytes: Vec<u8>,
}

impl StateSnapshot {
    pub(crate) fn encode(root: &Arc<TreeNode>) -> ShardResult<Self> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(root, &mut bytes)
            .map_err(|e| ShardError::payload_codec(e.to_string()))?;
        Ok(Self { bytes })
    }

    pub(crate) fn decode(&self) -> ShardResult<Arc<TreeNode>> {
        ciborium::de::from_reader(self.bytes.as_slice())
            .map_err(|e| ShardError::payload_codec(e.to_string()))
    }

    /// Wraps raw snapshot bytes received from another instance.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Returns the serialized bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}
