//! Immutable point-in-time tree views.

use crate::candidate::Candidate;
use crate::modification::Modification;
use crate::node::{subtree_at, TreeNode};
use crate::path::TreePath;
use std::sync::Arc;

/// An immutable point-in-time view of a tree.
///
/// Snapshots are cheap to clone and are jointly owned by every reader and
/// modification built from them; the underlying nodes are freed once the last
/// reference drops. A snapshot never changes after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    root: Arc<TreeNode>,
}

impl Snapshot {
    /// Returns a snapshot of an empty tree.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            root: Arc::new(TreeNode::container()),
        }
    }

    /// Creates a snapshot over the given root node.
    #[must_use]
    pub fn new(root: Arc<TreeNode>) -> Self {
        Self { root }
    }

    /// Returns the root node.
    #[must_use]
    pub fn root(&self) -> &Arc<TreeNode> {
        &self.root
    }

    /// Reads the subtree at `path`.
    #[must_use]
    pub fn read(&self, path: &TreePath) -> Option<Arc<TreeNode>> {
        subtree_at(&self.root, path)
    }

    /// Checks whether a node exists at `path`.
    #[must_use]
    pub fn exists(&self, path: &TreePath) -> bool {
        self.read(path).is_some()
    }

    /// Opens a new isolated modification based on this snapshot.
    #[must_use]
    pub fn new_modification(&self) -> Modification {
        Modification::new(self.clone())
    }

    /// Computes the structural diff moving this snapshot to `other`.
    ///
    /// The result covers every added, removed, and changed path and records
    /// nothing for unchanged subtrees.
    #[must_use]
    pub fn diff(&self, other: &Snapshot) -> Candidate {
        Candidate::compute(self, other)
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(segments: &[&str]) -> TreePath {
        TreePath::new(segments.iter().copied())
    }

    #[test]
    fn empty_snapshot_has_root_only() {
        let snapshot = Snapshot::empty();
        assert!(snapshot.exists(&TreePath::root()));
        assert!(!snapshot.exists(&path(&["cars"])));
    }

    #[test]
    fn read_returns_subtree() {
        let root = Arc::new(TreeNode::container().with_child("cars", TreeNode::leaf([1u8])));
        let snapshot = Snapshot::new(root);
        let cars = snapshot.read(&path(&["cars"])).unwrap();
        assert_eq!(cars.data(), Some(&[1u8][..]));
    }

    #[test]
    fn clones_share_nodes() {
        let snapshot = Snapshot::new(Arc::new(TreeNode::container().with_child(
            "cars",
            TreeNode::leaf([1u8]),
        )));
        let other = snapshot.clone();
        assert!(Arc::ptr_eq(snapshot.root(), other.root()));
    }
}
