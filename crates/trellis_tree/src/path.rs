//! Hierarchical path addressing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A path addressing one node in a hierarchical tree.
///
/// Paths are ordered lists of string segments. The empty path addresses the
/// tree root. Paths order lexicographically by segment, which places a parent
/// immediately before its children.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TreePath {
    segments: Vec<String>,
}

impl TreePath {
    /// Returns the root path.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Creates a path from an ordered list of segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the path extended by one segment.
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// Returns the parent path, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Checks whether this is the root path.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Checks whether the path has no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the path segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns the last segment, or `None` for the root.
    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Checks whether `prefix` is an ancestor of (or equal to) this path.
    #[must_use]
    pub fn starts_with(&self, prefix: &TreePath) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// Checks whether two paths address overlapping subtrees.
    ///
    /// Two paths overlap when either is an ancestor of the other.
    #[must_use]
    pub fn intersects(&self, other: &TreePath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_empty() {
        let root = TreePath::root();
        assert!(root.is_root());
        assert!(root.parent().is_none());
        assert_eq!(format!("{root}"), "/");
    }

    #[test]
    fn child_and_parent() {
        let cars = TreePath::root().child("cars");
        let list = cars.child("list");
        assert_eq!(list.parent(), Some(cars.clone()));
        assert_eq!(cars.parent(), Some(TreePath::root()));
        assert_eq!(format!("{list}"), "/cars/list");
    }

    #[test]
    fn starts_with_prefix() {
        let cars = TreePath::new(["cars"]);
        let optima = TreePath::new(["cars", "list", "optima"]);
        assert!(optima.starts_with(&cars));
        assert!(optima.starts_with(&TreePath::root()));
        assert!(!cars.starts_with(&optima));
    }

    #[test]
    fn intersects_is_symmetric() {
        let cars = TreePath::new(["cars"]);
        let optima = TreePath::new(["cars", "list", "optima"]);
        let people = TreePath::new(["people"]);
        assert!(cars.intersects(&optima));
        assert!(optima.intersects(&cars));
        assert!(!cars.intersects(&people));
    }

    #[test]
    fn parent_orders_before_child() {
        let cars = TreePath::new(["cars"]);
        let list = TreePath::new(["cars", "list"]);
        assert!(cars < list);
    }
}
