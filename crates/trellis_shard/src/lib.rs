//! Per-shard commit pipeline.
//!
//! Each shard owns one [`ShardDataTree`]: its authoritative data tree, a
//! speculative tentative tree, and a FIFO chain of pending transactions
//! moving through a three-phase commit. Transactions validate optimistically
//! when they finish, pipeline speculatively against tentative state, and
//! become authoritative only when the replication boundary confirms their
//! payload.
//!
//! ```
//! use std::sync::Arc;
//! use trellis_shard::{
//!     LoopbackLog, ShardConfig, ShardDataTree, ShardId, HistoryId, TransactionId,
//! };
//! use trellis_tree::{TreeNode, TreePath};
//!
//! let log = Arc::new(LoopbackLog::new());
//! let tree = ShardDataTree::new(ShardConfig::new(ShardId::new(0)), log.clone());
//! log.attach(&tree);
//!
//! let id = TransactionId::new(HistoryId::random(), 0);
//! let mut txn = tree.new_read_write_transaction(id);
//! txn.write(TreePath::new(["cars"]), Arc::new(TreeNode::container()))?;
//!
//! let cohort = tree.finish_transaction(txn, None)?;
//! cohort.can_commit(Box::new(|result| result.unwrap()));
//! cohort.pre_commit(Box::new(|result| {
//!     result.unwrap();
//! }));
//! cohort.commit(Box::new(|result| {
//!     result.unwrap();
//! }));
//! assert!(tree.take_snapshot().exists(&TreePath::new(["cars"])));
//! # Ok::<(), trellis_shard::ShardError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cohort;
mod config;
mod error;
mod listener;
mod payload;
mod replication;
mod transaction;
mod tree;
mod types;

pub use cohort::{
    AbortCallback, CanCommitCallback, CommitCallback, CompletionObserver, PreCommitCallback,
    ShardCohort,
};
pub use config::ShardConfig;
pub use error::{ShardError, ShardResult};
pub use listener::{ChannelListener, RegistrationId, TreeChangeListener};
pub use payload::{CommitPayload, StateSnapshot};
pub use replication::{LoopbackLog, RecordingLog, ReplicationLog};
pub use transaction::{ReadOnlyTransaction, ReadWriteTransaction};
pub use tree::ShardDataTree;
pub use types::{CommitSequence, HistoryId, ShardId, TransactionId};
