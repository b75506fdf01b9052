//! # Trellis Tree
//!
//! Hierarchical tree primitives for Trellis.
//!
//! This crate provides:
//! - [`TreePath`] - hierarchical path addressing
//! - [`TreeNode`] - structurally comparable tree content
//! - [`Snapshot`] - immutable point-in-time views with structural sharing
//! - [`Modification`] - mutable, isolated overlays recording write/merge/delete
//! - [`Candidate`] - immutable diffs produced by sealing a modification
//!
//! The shard commit pipeline is built on top of these primitives; nothing in
//! this crate knows about shards, replication, or commit ordering.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod candidate;
mod error;
mod modification;
mod node;
mod path;
mod snapshot;

pub use candidate::{Candidate, CandidateNode, ModificationKind, TreeChange};
pub use error::{TreeError, TreeResult};
pub use modification::{Modification, Operation};
pub use node::TreeNode;
pub use path::TreePath;
pub use snapshot::Snapshot;
