//! Client frontend for the sharded store.
//!
//! A [`ClientHistory`] hands out ordered transactions that fan out lazily to
//! the shards they touch, routed by a [`ShardResolver`]. Readying a
//! transaction yields a [`ClientCohort`] that drives the three commit phases
//! across every participating shard and aggregates their outcomes. The
//! history also tracks, per shard, which transaction indices that shard
//! never saw, and reports the gaps the next time the shard is touched.
//!
//! ```
//! use std::sync::Arc;
//! use trellis_client::{ClientHistory, PrefixResolver};
//! use trellis_shard::{LoopbackLog, ShardConfig, ShardDataTree, ShardId};
//! use trellis_tree::{TreeNode, TreePath};
//!
//! let log = Arc::new(LoopbackLog::new());
//! let shard = ShardDataTree::new(ShardConfig::new(ShardId::new(0)), log.clone());
//! log.attach(&shard);
//!
//! let resolver = PrefixResolver::new(ShardId::new(0)).with_shard(ShardId::new(0), shard.clone());
//! let history = ClientHistory::new(Arc::new(resolver));
//!
//! let txn = history.new_transaction();
//! txn.write(TreePath::new(["cars"]), Arc::new(TreeNode::container()))?;
//! let cohort = txn.ready()?;
//! cohort.can_commit(Box::new(|result| result.unwrap()));
//! cohort.pre_commit(Box::new(|result| result.unwrap()));
//! cohort.commit(Box::new(|result| result.unwrap()));
//! assert!(shard.take_snapshot().exists(&TreePath::new(["cars"])));
//! # Ok::<(), trellis_client::ClientError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cohort;
mod error;
mod history;
mod resolver;
mod transaction;

pub use cohort::{ClientCohort, CohortCallback};
pub use error::{ClientError, ClientResult};
pub use history::ClientHistory;
pub use resolver::{PrefixResolver, ShardResolver};
pub use transaction::ClientTransaction;
