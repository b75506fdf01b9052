//! Tree node content.

use crate::path::TreePath;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One node of the hierarchical data tree.
///
/// A node carries optional opaque data and an ordered child map. The engine
/// never interprets node data; it only compares it structurally. Children are
/// `Arc`-shared so snapshots built from one another share unchanged subtrees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Opaque data carried by this node.
    data: Option<Vec<u8>>,
    /// Child subtrees keyed by segment.
    children: BTreeMap<String, Arc<TreeNode>>,
}

impl TreeNode {
    /// Creates an empty container node.
    #[must_use]
    pub fn container() -> Self {
        Self::default()
    }

    /// Creates a node carrying the given data and no children.
    #[must_use]
    pub fn leaf(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Some(data.into()),
            children: BTreeMap::new(),
        }
    }

    /// Returns the node data, if any.
    #[must_use]
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Returns the child under `segment`, if present.
    #[must_use]
    pub fn child(&self, segment: &str) -> Option<&Arc<TreeNode>> {
        self.children.get(segment)
    }

    /// Returns the child map.
    #[must_use]
    pub fn children(&self) -> &BTreeMap<String, Arc<TreeNode>> {
        &self.children
    }

    pub(crate) fn children_mut(&mut self) -> &mut BTreeMap<String, Arc<TreeNode>> {
        &mut self.children
    }

    /// Returns a copy of this node with the given child attached.
    #[must_use]
    pub fn with_child(mut self, segment: impl Into<String>, child: TreeNode) -> Self {
        self.children.insert(segment.into(), Arc::new(child));
        self
    }

    /// Returns a copy of this node with the given data.
    #[must_use]
    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Finds the node at `path` relative to this node.
    #[must_use]
    pub fn find(&self, path: &TreePath) -> Option<&TreeNode> {
        let mut current = self;
        for segment in path.segments() {
            current = current.children.get(segment)?;
        }
        Some(current)
    }

    /// Checks whether a node exists at `path` relative to this node.
    #[must_use]
    pub fn contains(&self, path: &TreePath) -> bool {
        self.find(path).is_some()
    }
}

/// Looks up the subtree at `path`, cloning the owning `Arc`.
pub(crate) fn subtree_at(root: &Arc<TreeNode>, path: &TreePath) -> Option<Arc<TreeNode>> {
    if path.is_root() {
        return Some(Arc::clone(root));
    }
    let mut current = root;
    for segment in path.segments() {
        current = current.children.get(segment)?;
    }
    Some(Arc::clone(current))
}

/// Replaces the subtree at `path`, creating missing ancestors as containers.
///
/// Structural ancestor creation mirrors how operations are recorded against
/// an isolated overlay; whether the parent path legitimately exists is
/// enforced later, when the candidate is validated against tentative state.
pub(crate) fn write_at(root: &Arc<TreeNode>, path: &TreePath, node: Arc<TreeNode>) -> Arc<TreeNode> {
    replace_at(root, path.segments(), Some(node))
}

/// Removes the subtree at `path`. Removing an absent path is a no-op;
/// removing the root yields an empty container.
pub(crate) fn delete_at(root: &Arc<TreeNode>, path: &TreePath) -> Arc<TreeNode> {
    if path.is_root() {
        return Arc::new(TreeNode::container());
    }
    if !root.contains(path) {
        return Arc::clone(root);
    }
    replace_at(root, path.segments(), None)
}

/// Deep-merges `node` into the subtree at `path`, creating missing ancestors.
pub(crate) fn merge_at(root: &Arc<TreeNode>, path: &TreePath, node: &Arc<TreeNode>) -> Arc<TreeNode> {
    let merged = match subtree_at(root, path) {
        Some(existing) => Arc::new(merge_nodes(&existing, node)),
        None => Arc::clone(node),
    };
    replace_at(root, path.segments(), Some(merged))
}

fn replace_at(root: &Arc<TreeNode>, segments: &[String], node: Option<Arc<TreeNode>>) -> Arc<TreeNode> {
    match segments.split_first() {
        None => node.unwrap_or_else(|| Arc::new(TreeNode::container())),
        Some((head, rest)) => {
            let mut updated = (**root).clone();
            let child = updated
                .children
                .get(head)
                .cloned()
                .unwrap_or_else(|| Arc::new(TreeNode::container()));
            if rest.is_empty() && node.is_none() {
                updated.children.remove(head);
            } else {
                updated
                    .children
                    .insert(head.clone(), replace_at(&child, rest, node));
            }
            Arc::new(updated)
        }
    }
}

fn merge_nodes(base: &TreeNode, incoming: &TreeNode) -> TreeNode {
    let mut merged = base.clone();
    if incoming.data.is_some() {
        merged.data = incoming.data.clone();
    }
    for (segment, child) in &incoming.children {
        let combined = match base.children.get(segment) {
            Some(existing) => Arc::new(merge_nodes(existing, child)),
            None => Arc::clone(child),
        };
        merged.children.insert(segment.clone(), combined);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(segments: &[&str]) -> TreePath {
        TreePath::new(segments.iter().copied())
    }

    #[test]
    fn find_walks_segments() {
        let root = TreeNode::container()
            .with_child("cars", TreeNode::container().with_child("optima", TreeNode::leaf([1u8])));
        let found = root.find(&path(&["cars", "optima"])).unwrap();
        assert_eq!(found.data(), Some(&[1u8][..]));
        assert!(root.find(&path(&["people"])).is_none());
    }

    #[test]
    fn write_creates_missing_ancestors() {
        let root = Arc::new(TreeNode::container());
        let updated = write_at(&root, &path(&["cars", "optima"]), Arc::new(TreeNode::leaf([1u8])));
        assert!(updated.contains(&path(&["cars", "optima"])));
        // original root untouched
        assert!(!root.contains(&path(&["cars"])));
    }

    #[test]
    fn write_shares_unchanged_siblings() {
        let root = Arc::new(
            TreeNode::container()
                .with_child("cars", TreeNode::leaf([1u8]))
                .with_child("people", TreeNode::leaf([2u8])),
        );
        let people = Arc::clone(root.child("people").unwrap());
        let updated = write_at(&root, &path(&["cars"]), Arc::new(TreeNode::leaf([3u8])));
        assert!(Arc::ptr_eq(updated.child("people").unwrap(), &people));
    }

    #[test]
    fn delete_removes_subtree() {
        let root = Arc::new(TreeNode::container().with_child("cars", TreeNode::leaf([1u8])));
        let updated = delete_at(&root, &path(&["cars"]));
        assert!(!updated.contains(&path(&["cars"])));
    }

    #[test]
    fn delete_absent_path_is_noop() {
        let root = Arc::new(TreeNode::container().with_child("cars", TreeNode::leaf([1u8])));
        let updated = delete_at(&root, &path(&["people"]));
        assert!(Arc::ptr_eq(&updated, &root));
    }

    #[test]
    fn delete_root_yields_empty_container() {
        let root = Arc::new(TreeNode::container().with_child("cars", TreeNode::leaf([1u8])));
        let updated = delete_at(&root, &TreePath::root());
        assert_eq!(*updated, TreeNode::container());
    }

    #[test]
    fn merge_combines_children() {
        let root = Arc::new(TreeNode::container().with_child(
            "cars",
            TreeNode::container().with_child("optima", TreeNode::leaf([1u8])),
        ));
        let incoming = Arc::new(TreeNode::container().with_child("sportage", TreeNode::leaf([2u8])));
        let updated = merge_at(&root, &path(&["cars"]), &incoming);
        assert!(updated.contains(&path(&["cars", "optima"])));
        assert!(updated.contains(&path(&["cars", "sportage"])));
    }

    #[test]
    fn merge_overwrites_data_keeps_missing() {
        let root = Arc::new(TreeNode::container().with_child("cars", TreeNode::leaf([1u8])));
        let incoming = Arc::new(TreeNode::container());
        let updated = merge_at(&root, &path(&["cars"]), &incoming);
        // incoming carries no data, so existing data survives
        assert_eq!(updated.find(&path(&["cars"])).unwrap().data(), Some(&[1u8][..]));
    }

    #[test]
    fn merge_creates_missing_path() {
        let root = Arc::new(TreeNode::container());
        let incoming = Arc::new(TreeNode::leaf([7u8]));
        let updated = merge_at(&root, &path(&["cars", "list"]), &incoming);
        assert_eq!(updated.find(&path(&["cars", "list"])).unwrap().data(), Some(&[7u8][..]));
    }
}
