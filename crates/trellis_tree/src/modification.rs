//! Mutable, isolated overlays over a snapshot.

use crate::candidate::Candidate;
use crate::error::{TreeError, TreeResult};
use crate::node::{delete_at, merge_at, subtree_at, write_at, TreeNode};
use crate::path::TreePath;
use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A single recorded tree operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Replace the subtree at `path` with `node`.
    Write {
        /// Target path.
        path: TreePath,
        /// Replacement subtree.
        node: Arc<TreeNode>,
    },
    /// Deep-merge `node` into the subtree at `path`.
    Merge {
        /// Target path.
        path: TreePath,
        /// Subtree to merge in.
        node: Arc<TreeNode>,
    },
    /// Remove the subtree at `path`.
    Delete {
        /// Target path.
        path: TreePath,
    },
}

impl Operation {
    /// Returns the path this operation targets.
    #[must_use]
    pub fn path(&self) -> &TreePath {
        match self {
            Self::Write { path, .. } | Self::Merge { path, .. } | Self::Delete { path } => path,
        }
    }
}

/// A mutable, isolated overlay recording operations against a base snapshot.
///
/// A modification belongs to exactly one transaction. Reads observe the base
/// snapshot plus every operation recorded so far; the base itself is never
/// affected. Sealing makes the modification immutable: any further mutation
/// fails with [`TreeError::Sealed`].
#[derive(Debug, Clone)]
pub struct Modification {
    base: Snapshot,
    working: Arc<TreeNode>,
    ops: Vec<Operation>,
    sealed: bool,
}

impl Modification {
    pub(crate) fn new(base: Snapshot) -> Self {
        let working = Arc::clone(base.root());
        Self {
            base,
            working,
            ops: Vec::new(),
            sealed: false,
        }
    }

    /// Returns the base snapshot this modification was opened on.
    #[must_use]
    pub fn base(&self) -> &Snapshot {
        &self.base
    }

    /// Returns the operations recorded so far, in order.
    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.ops
    }

    /// Checks whether the modification has been sealed.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Replaces the subtree at `path`.
    pub fn write(&mut self, path: TreePath, node: Arc<TreeNode>) -> TreeResult<()> {
        self.ensure_open()?;
        self.working = write_at(&self.working, &path, Arc::clone(&node));
        self.ops.push(Operation::Write { path, node });
        Ok(())
    }

    /// Deep-merges `node` into the subtree at `path`, creating missing
    /// ancestors.
    pub fn merge(&mut self, path: TreePath, node: Arc<TreeNode>) -> TreeResult<()> {
        self.ensure_open()?;
        self.working = merge_at(&self.working, &path, &node);
        self.ops.push(Operation::Merge { path, node });
        Ok(())
    }

    /// Removes the subtree at `path`.
    pub fn delete(&mut self, path: TreePath) -> TreeResult<()> {
        self.ensure_open()?;
        self.working = delete_at(&self.working, &path);
        self.ops.push(Operation::Delete { path });
        Ok(())
    }

    /// Reads the subtree at `path`, observing base plus overlay.
    #[must_use]
    pub fn read(&self, path: &TreePath) -> Option<Arc<TreeNode>> {
        subtree_at(&self.working, path)
    }

    /// Checks whether a node exists at `path`, observing base plus overlay.
    #[must_use]
    pub fn exists(&self, path: &TreePath) -> bool {
        self.read(path).is_some()
    }

    /// Seals the modification. Idempotent; no mutation is accepted afterwards.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Returns the tree produced by applying the overlay to the base.
    #[must_use]
    pub fn result(&self) -> Snapshot {
        Snapshot::new(Arc::clone(&self.working))
    }

    /// Computes the candidate diff for this sealed modification.
    ///
    /// # Errors
    ///
    /// Fails with [`TreeError::NotSealed`] if the modification is still open.
    pub fn to_candidate(&self) -> TreeResult<Candidate> {
        if !self.sealed {
            return Err(TreeError::NotSealed);
        }
        Ok(Candidate::compute(&self.base, &self.result()))
    }

    fn ensure_open(&self) -> TreeResult<()> {
        if self.sealed {
            return Err(TreeError::Sealed);
        }
        Ok(())
    }
}
