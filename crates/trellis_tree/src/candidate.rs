//! Immutable diffs between two trees.

use crate::error::TreeResult;
use crate::modification::Modification;
use crate::node::TreeNode;
use crate::path::TreePath;
use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Kind of change recorded for one node of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModificationKind {
    /// The subtree was written (created or replaced).
    Write,
    /// The subtree was deleted.
    Delete,
    /// The node is untouched.
    Unmodified,
    /// The node itself is untouched but some descendant changed.
    SubtreeModified,
}

/// Per-node change record inside a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateNode {
    kind: ModificationKind,
    before: Option<Arc<TreeNode>>,
    after: Option<Arc<TreeNode>>,
    children: BTreeMap<String, CandidateNode>,
}

impl CandidateNode {
    /// Returns the kind of change at this node.
    #[must_use]
    pub fn kind(&self) -> ModificationKind {
        self.kind
    }

    /// Returns the subtree before the change, if it existed.
    #[must_use]
    pub fn before(&self) -> Option<&Arc<TreeNode>> {
        self.before.as_ref()
    }

    /// Returns the subtree after the change, if it exists.
    #[must_use]
    pub fn after(&self) -> Option<&Arc<TreeNode>> {
        self.after.as_ref()
    }

    /// Returns the changed children. Unmodified children are omitted.
    #[must_use]
    pub fn children(&self) -> &BTreeMap<String, CandidateNode> {
        &self.children
    }

    fn unmodified(node: Option<&Arc<TreeNode>>) -> Self {
        Self {
            kind: ModificationKind::Unmodified,
            before: node.cloned(),
            after: node.cloned(),
            children: BTreeMap::new(),
        }
    }
}

/// A single flattened change extracted from a candidate.
///
/// Changes are reported at the shallowest changed node: writing a whole new
/// subtree yields one change at its root rather than one per descendant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeChange {
    /// Path of the changed node.
    pub path: TreePath,
    /// Whether the node was written or deleted.
    pub kind: ModificationKind,
    /// The subtree now in place, for writes.
    pub after: Option<Arc<TreeNode>>,
}

/// An immutable diff moving one tree to another.
///
/// A candidate is derived exactly once from a sealed modification (or from a
/// full-tree comparison) and never changes afterwards. Equality is
/// structural.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    root_path: TreePath,
    root: CandidateNode,
}

impl Candidate {
    /// Computes the diff moving `base` to `result`.
    #[must_use]
    pub fn compute(base: &Snapshot, result: &Snapshot) -> Self {
        Self {
            root_path: TreePath::root(),
            root: diff_nodes(Some(base.root()), Some(result.root())),
        }
    }

    /// Returns the path the diff is rooted at.
    #[must_use]
    pub fn root_path(&self) -> &TreePath {
        &self.root_path
    }

    /// Returns the root change record.
    #[must_use]
    pub fn root(&self) -> &CandidateNode {
        &self.root
    }

    /// Checks whether the candidate records no change at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.kind == ModificationKind::Unmodified
    }

    /// Applies the diff to a snapshot, returning the resulting snapshot.
    #[must_use]
    pub fn apply_to(&self, snapshot: &Snapshot) -> Snapshot {
        let root = apply_node(&self.root, Some(Arc::clone(snapshot.root())))
            .unwrap_or_else(|| Arc::new(TreeNode::container()));
        Snapshot::new(root)
    }

    /// Replays the diff into a modification as write/delete operations.
    ///
    /// Replay is deterministic: applying the same candidate sequence twice
    /// leaves the tree exactly as one application does.
    pub fn apply_to_modification(&self, modification: &mut Modification) -> TreeResult<()> {
        for change in self.changes() {
            match change.kind {
                ModificationKind::Write => {
                    if let Some(node) = change.after {
                        modification.write(change.path, node)?;
                    }
                }
                ModificationKind::Delete => modification.delete(change.path)?,
                ModificationKind::Unmodified | ModificationKind::SubtreeModified => {}
            }
        }
        Ok(())
    }

    /// Flattens the diff to the shallowest changed paths.
    #[must_use]
    pub fn changes(&self) -> Vec<TreeChange> {
        let mut changes = Vec::new();
        collect_changes(&self.root, &self.root_path, &mut changes);
        changes
    }
}

fn diff_nodes(before: Option<&Arc<TreeNode>>, after: Option<&Arc<TreeNode>>) -> CandidateNode {
    match (before, after) {
        (None, None) => CandidateNode::unmodified(None),
        (None, Some(a)) => CandidateNode {
            kind: ModificationKind::Write,
            before: None,
            after: Some(Arc::clone(a)),
            children: BTreeMap::new(),
        },
        (Some(b), None) => CandidateNode {
            kind: ModificationKind::Delete,
            before: Some(Arc::clone(b)),
            after: None,
            children: BTreeMap::new(),
        },
        (Some(b), Some(a)) => {
            if Arc::ptr_eq(b, a) || b == a {
                return CandidateNode::unmodified(Some(a));
            }
            if b.data() != a.data() {
                // data change rewrites the node; descendants ride along
                return CandidateNode {
                    kind: ModificationKind::Write,
                    before: Some(Arc::clone(b)),
                    after: Some(Arc::clone(a)),
                    children: BTreeMap::new(),
                };
            }
            let mut children = BTreeMap::new();
            for segment in b.children().keys().chain(a.children().keys()) {
                if children.contains_key(segment) {
                    continue;
                }
                let child = diff_nodes(b.child(segment), a.child(segment));
                if child.kind != ModificationKind::Unmodified {
                    children.insert(segment.clone(), child);
                }
            }
            if children.is_empty() {
                CandidateNode::unmodified(Some(a))
            } else {
                CandidateNode {
                    kind: ModificationKind::SubtreeModified,
                    before: Some(Arc::clone(b)),
                    after: Some(Arc::clone(a)),
                    children,
                }
            }
        }
    }
}

fn apply_node(candidate: &CandidateNode, current: Option<Arc<TreeNode>>) -> Option<Arc<TreeNode>> {
    match candidate.kind {
        ModificationKind::Unmodified => current,
        ModificationKind::Write => candidate.after.clone(),
        ModificationKind::Delete => None,
        ModificationKind::SubtreeModified => {
            let mut node = current.map(|n| (*n).clone()).unwrap_or_default();
            for (segment, child) in &candidate.children {
                let existing = node.child(segment).cloned();
                match apply_node(child, existing) {
                    Some(updated) => {
                        node.children_mut().insert(segment.clone(), updated);
                    }
                    None => {
                        node.children_mut().remove(segment);
                    }
                }
            }
            Some(Arc::new(node))
        }
    }
}

fn collect_changes(node: &CandidateNode, path: &TreePath, out: &mut Vec<TreeChange>) {
    match node.kind {
        ModificationKind::Unmodified => {}
        ModificationKind::Write => out.push(TreeChange {
            path: path.clone(),
            kind: ModificationKind::Write,
            after: node.after.clone(),
        }),
        ModificationKind::Delete => out.push(TreeChange {
            path: path.clone(),
            kind: ModificationKind::Delete,
            after: None,
        }),
        ModificationKind::SubtreeModified => {
            for (segment, child) in &node.children {
                collect_changes(child, &path.child(segment.clone()), out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(segments: &[&str]) -> TreePath {
        TreePath::new(segments.iter().copied())
    }

    fn leaf(byte: u8) -> Arc<TreeNode> {
        Arc::new(TreeNode::leaf([byte]))
    }

    fn snapshot_with(pairs: &[(&[&str], u8)]) -> Snapshot {
        let mut modification = Snapshot::empty().new_modification();
        for (segments, byte) in pairs {
            modification.write(path(segments), leaf(*byte)).unwrap();
        }
        modification.result()
    }

    #[test]
    fn diff_of_identical_trees_is_empty() {
        let snapshot = snapshot_with(&[(&["cars"], 1)]);
        let candidate = snapshot.diff(&snapshot.clone());
        assert!(candidate.is_empty());
        assert!(candidate.changes().is_empty());
    }

    #[test]
    fn diff_reports_shallowest_changes() {
        let before = snapshot_with(&[(&["cars", "optima"], 1), (&["people", "alice"], 2)]);
        let after = snapshot_with(&[(&["cars", "optima"], 1), (&["people", "alice"], 3)]);
        let changes = before.diff(&after).changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, path(&["people", "alice"]));
        assert_eq!(changes[0].kind, ModificationKind::Write);
    }

    #[test]
    fn diff_covers_add_remove_and_silence() {
        let before = snapshot_with(&[(&["p2"], 2), (&["p3"], 3)]);
        let after = snapshot_with(&[(&["p1"], 1), (&["p3"], 3)]);
        let changes = before.diff(&after).changes();
        let mut kinds: Vec<(String, ModificationKind)> = changes
            .iter()
            .map(|c| (c.path.to_string(), c.kind))
            .collect();
        kinds.sort();
        assert_eq!(
            kinds,
            vec![
                ("/p1".to_string(), ModificationKind::Write),
                ("/p2".to_string(), ModificationKind::Delete),
            ]
        );
    }

    #[test]
    fn apply_reproduces_modification_result() {
        let base = snapshot_with(&[(&["cars", "optima"], 1)]);
        let mut modification = base.new_modification();
        modification.write(path(&["cars", "sportage"]), leaf(2)).unwrap();
        modification.delete(path(&["cars", "optima"])).unwrap();
        modification.seal();
        let candidate = modification.to_candidate().unwrap();
        assert_eq!(candidate.apply_to(&base), modification.result());
    }

    #[test]
    fn replay_twice_is_idempotent() {
        // add then remove, applied twice, must equal applying once
        let base = snapshot_with(&[(&["cars"], 0)]);

        let mut add = base.new_modification();
        add.write(path(&["cars", "optima"]), leaf(1)).unwrap();
        add.seal();
        let add_candidate = add.to_candidate().unwrap();

        let after_add = add_candidate.apply_to(&base);
        let mut remove = after_add.new_modification();
        remove.delete(path(&["cars", "optima"])).unwrap();
        remove.seal();
        let remove_candidate = remove.to_candidate().unwrap();

        let mut once = base.new_modification();
        add_candidate.apply_to_modification(&mut once).unwrap();
        remove_candidate.apply_to_modification(&mut once).unwrap();

        let mut twice = base.new_modification();
        for _ in 0..2 {
            add_candidate.apply_to_modification(&mut twice).unwrap();
            remove_candidate.apply_to_modification(&mut twice).unwrap();
        }

        assert_eq!(once.result(), twice.result());
        assert!(!twice.result().exists(&path(&["cars", "optima"])));
    }

    #[test]
    fn whole_subtree_write_is_one_change() {
        let before = Snapshot::empty();
        let after = snapshot_with(&[(&["cars", "list", "optima"], 1)]);
        let changes = before.diff(&after).changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, path(&["cars"]));
    }

    #[test]
    fn data_change_rewrites_node() {
        let before = snapshot_with(&[(&["cars"], 1)]);
        let after = snapshot_with(&[(&["cars"], 2)]);
        let candidate = before.diff(&after);
        let changes = candidate.changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ModificationKind::Write);
        assert_eq!(changes[0].path, path(&["cars"]));
    }

    #[test]
    fn candidate_equality_is_structural() {
        let before = Snapshot::empty();
        let after = snapshot_with(&[(&["cars"], 1)]);
        let first = before.diff(&after);
        let second = before.diff(&after);
        assert_eq!(first, second);
    }
}
