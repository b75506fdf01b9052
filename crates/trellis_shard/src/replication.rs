//! Replication boundary.
//!
//! The pipeline does not replicate by itself; it hands each committing
//! transaction's payload to a [`ReplicationLog`] and waits for the commit to
//! come back through [`ShardDataTree::apply_replicated_payload`]. The two
//! implementations here are test doubles: a recorder that only observes, and
//! a loopback that applies every append locally on the spot.
//!
//! [`ShardDataTree::apply_replicated_payload`]: crate::tree::ShardDataTree::apply_replicated_payload

use crate::error::ShardResult;
use crate::payload::CommitPayload;
use crate::tree::ShardDataTree;
use crate::types::TransactionId;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Durable, ordered log of commit payloads.
///
/// `batch_hint` is `true` when the pipeline already knows another append
/// follows immediately; an implementation may hold its flush until an append
/// arrives with the hint cleared.
pub trait ReplicationLog: Send + Sync {
    /// Appends one transaction's payload to the log.
    fn append(&self, id: TransactionId, payload: CommitPayload, batch_hint: bool)
        -> ShardResult<()>;
}

/// Records every append without acting on it.
#[derive(Debug, Default)]
pub struct RecordingLog {
    entries: Mutex<Vec<(TransactionId, CommitPayload, bool)>>,
}

impl RecordingLog {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the appended ids and batch hints, in append order.
    #[must_use]
    pub fn appends(&self) -> Vec<(TransactionId, bool)> {
        self.entries
            .lock()
            .iter()
            .map(|(id, _, hint)| (*id, *hint))
            .collect()
    }

    /// Returns the payload appended for `id`, if any.
    #[must_use]
    pub fn payload_for(&self, id: TransactionId) -> Option<CommitPayload> {
        self.entries
            .lock()
            .iter()
            .find(|(entry_id, _, _)| *entry_id == id)
            .map(|(_, payload, _)| payload.clone())
    }
}

impl ReplicationLog for RecordingLog {
    fn append(
        &self,
        id: TransactionId,
        payload: CommitPayload,
        batch_hint: bool,
    ) -> ShardResult<()> {
        self.entries.lock().push((id, payload, batch_hint));
        Ok(())
    }
}

/// Applies every append straight back into the shard it is attached to.
///
/// Stands in for a single-member replica set where every append is
/// immediately durable.
#[derive(Debug, Default)]
pub struct LoopbackLog {
    tree: Mutex<Weak<ShardDataTree>>,
    entries: Mutex<Vec<(TransactionId, bool)>>,
}

impl LoopbackLog {
    /// Creates a detached loopback log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches the log to the shard it feeds back into.
    pub fn attach(&self, tree: &Arc<ShardDataTree>) {
        *self.tree.lock() = Arc::downgrade(tree);
    }

    /// Returns the appended ids and batch hints, in append order.
    #[must_use]
    pub fn appends(&self) -> Vec<(TransactionId, bool)> {
        self.entries.lock().clone()
    }
}

impl ReplicationLog for LoopbackLog {
    fn append(
        &self,
        id: TransactionId,
        payload: CommitPayload,
        batch_hint: bool,
    ) -> ShardResult<()> {
        self.entries.lock().push((id, batch_hint));
        let tree = self.tree.lock().upgrade();
        if let Some(tree) = tree {
            tree.apply_replicated_payload(id, &payload)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HistoryId;
    use trellis_tree::Snapshot;

    #[test]
    fn recording_log_preserves_order() {
        let log = RecordingLog::new();
        let history = HistoryId::random();
        let empty = Snapshot::empty().diff(&Snapshot::empty());
        let t1 = TransactionId::new(history, 1);
        let t2 = TransactionId::new(history, 2);
        log.append(t1, CommitPayload::encode(t1, &empty).unwrap(), true)
            .unwrap();
        log.append(t2, CommitPayload::encode(t2, &empty).unwrap(), false)
            .unwrap();
        assert_eq!(log.appends(), vec![(t1, true), (t2, false)]);
        assert!(log.payload_for(t1).is_some());
    }
}
