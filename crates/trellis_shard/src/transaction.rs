//! Per-shard transaction frontends.

use crate::error::ShardResult;
use crate::types::TransactionId;
use std::sync::Arc;
use trellis_tree::{Modification, Snapshot, TreeNode, TreePath};

/// A read-only transaction over one immutable snapshot.
///
/// Reads are answered locally from the snapshot and never block behind the
/// commit pipeline.
#[derive(Debug, Clone)]
pub struct ReadOnlyTransaction {
    id: TransactionId,
    snapshot: Snapshot,
}

impl ReadOnlyTransaction {
    pub(crate) fn new(id: TransactionId, snapshot: Snapshot) -> Self {
        Self { id, snapshot }
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the snapshot this transaction observes.
    #[must_use]
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Reads the subtree at `path`.
    #[must_use]
    pub fn read(&self, path: &TreePath) -> Option<Arc<TreeNode>> {
        self.snapshot.read(path)
    }

    /// Checks whether a node exists at `path`.
    #[must_use]
    pub fn exists(&self, path: &TreePath) -> bool {
        self.snapshot.exists(path)
    }
}

/// A read-write transaction recording operations against its base snapshot.
///
/// The transaction observes its own writes; nothing is visible to other
/// transactions until it commits through the pipeline.
#[derive(Debug)]
pub struct ReadWriteTransaction {
    id: TransactionId,
    modification: Modification,
}

impl ReadWriteTransaction {
    pub(crate) fn new(id: TransactionId, snapshot: &Snapshot) -> Self {
        Self {
            id,
            modification: snapshot.new_modification(),
        }
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Reads the subtree at `path`, observing this transaction's own writes.
    #[must_use]
    pub fn read(&self, path: &TreePath) -> Option<Arc<TreeNode>> {
        self.modification.read(path)
    }

    /// Checks whether a node exists at `path`.
    #[must_use]
    pub fn exists(&self, path: &TreePath) -> bool {
        self.modification.exists(path)
    }

    /// Replaces the subtree at `path`.
    pub fn write(&mut self, path: TreePath, node: Arc<TreeNode>) -> ShardResult<()> {
        self.modification.write(path, node)?;
        Ok(())
    }

    /// Deep-merges `node` into the subtree at `path`.
    pub fn merge(&mut self, path: TreePath, node: Arc<TreeNode>) -> ShardResult<()> {
        self.modification.merge(path, node)?;
        Ok(())
    }

    /// Removes the subtree at `path`.
    pub fn delete(&mut self, path: TreePath) -> ShardResult<()> {
        self.modification.delete(path)?;
        Ok(())
    }

    /// Returns the modification recorded so far.
    #[must_use]
    pub fn modification(&self) -> &Modification {
        &self.modification
    }

    pub(crate) fn into_parts(self) -> (TransactionId, Modification) {
        (self.id, self.modification)
    }
}
