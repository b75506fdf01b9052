//! Client transactions fanning out across shards.

use crate::cohort::ClientCohort;
use crate::error::{ClientError, ClientResult};
use crate::history::ClientHistory;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::debug;
use trellis_shard::{ReadWriteTransaction, ShardCohort, ShardDataTree, ShardId, TransactionId};
use trellis_tree::{TreeNode, TreePath};

const OPEN: u8 = 0;
const CLOSED: u8 = 1;

struct ProxyTransaction {
    tree: Arc<ShardDataTree>,
    txn: ReadWriteTransaction,
    preceding_gaps: Vec<u64>,
}

impl ProxyTransaction {
    fn seal(self) -> ClientResult<ShardCohort> {
        Ok(self.tree.finish_transaction(self.txn, None)?)
    }
}

/// One logical transaction spanning every shard it touches.
///
/// Shard proxies are opened lazily on first access. Reads observe the
/// transaction's own writes. Readying the transaction seals every proxy and
/// produces a cohort shaped by how many shards were touched; aborting it
/// discards the proxies. Both close the transaction, and a closed transaction
/// rejects all further operations.
pub struct ClientTransaction {
    id: TransactionId,
    history: Arc<ClientHistory>,
    proxies: Mutex<HashMap<ShardId, ProxyTransaction>>,
    state: AtomicU8,
}

impl ClientTransaction {
    pub(crate) fn new(id: TransactionId, history: Arc<ClientHistory>) -> Self {
        Self {
            id,
            history,
            proxies: Mutex::new(HashMap::new()),
            state: AtomicU8::new(OPEN),
        }
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Reads the subtree at `path`, observing this transaction's own writes.
    pub fn read(&self, path: &TreePath) -> ClientResult<Option<Arc<TreeNode>>> {
        self.with_proxy(path, |proxy| proxy.txn.read(path))
    }

    /// Checks whether a node exists at `path`.
    pub fn exists(&self, path: &TreePath) -> ClientResult<bool> {
        self.with_proxy(path, |proxy| proxy.txn.exists(path))
    }

    /// Replaces the subtree at `path`.
    pub fn write(&self, path: TreePath, node: Arc<TreeNode>) -> ClientResult<()> {
        let target = path.clone();
        self.with_proxy(&target, |proxy| proxy.txn.write(path, node))?
            .map_err(Into::into)
    }

    /// Deep-merges `node` into the subtree at `path`.
    pub fn merge(&self, path: TreePath, node: Arc<TreeNode>) -> ClientResult<()> {
        let target = path.clone();
        self.with_proxy(&target, |proxy| proxy.txn.merge(path, node))?
            .map_err(Into::into)
    }

    /// Removes the subtree at `path`.
    pub fn delete(&self, path: TreePath) -> ClientResult<()> {
        let target = path.clone();
        self.with_proxy(&target, |proxy| proxy.txn.delete(path))?
            .map_err(Into::into)
    }

    /// Seals the transaction and selects its commit cohort.
    ///
    /// A transaction that touched no shard yields an empty cohort, one shard
    /// a direct cohort, more a multi-shard cohort whose phases fan out to
    /// every participant.
    ///
    /// # Errors
    ///
    /// Fails with [`ClientError::Closed`] if the transaction was already
    /// readied or aborted, or propagates the first shard that rejects its
    /// part of the transaction.
    pub fn ready(self) -> ClientResult<ClientCohort> {
        self.close()?;
        let proxies = self.proxies.into_inner();
        let touched: Vec<ShardId> = proxies.keys().copied().collect();
        self.history.on_transaction_closed(self.id.index(), &touched);

        let mut sealed: Vec<(ShardId, ProxyTransaction)> = proxies.into_iter().collect();
        sealed.sort_by_key(|(shard, _)| *shard);
        debug!(txn = %self.id, shards = sealed.len(), "transaction ready");

        let mut participants: Vec<ShardCohort> = Vec::with_capacity(sealed.len());
        for (_, proxy) in sealed {
            match proxy.seal() {
                Ok(cohort) => participants.push(cohort),
                Err(err) => {
                    // release entries already enqueued on the healthy shards
                    for cohort in &participants {
                        cohort.abort(Box::new(|_| {}));
                    }
                    return Err(err);
                }
            }
        }
        Ok(ClientCohort::new(self.id, participants))
    }

    /// Aborts the transaction, discarding all recorded operations.
    /// Idempotent; aborting a closed transaction does nothing.
    pub fn abort(&self) {
        if self.close().is_ok() {
            debug!(txn = %self.id, "transaction aborted");
            self.proxies.lock().clear();
            self.history.on_transaction_closed(self.id.index(), &[]);
        }
    }

    fn close(&self) -> ClientResult<()> {
        self.state
            .compare_exchange(OPEN, CLOSED, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| ClientError::Closed { id: self.id })
    }

    fn with_proxy<R>(
        &self,
        path: &TreePath,
        f: impl FnOnce(&mut ProxyTransaction) -> R,
    ) -> ClientResult<R> {
        if self.state.load(Ordering::Acquire) != OPEN {
            return Err(ClientError::Closed { id: self.id });
        }
        let shard_id = self.history.resolver().resolve(path);
        let mut proxies = self.proxies.lock();
        if !proxies.contains_key(&shard_id) {
            let tree = self
                .history
                .resolver()
                .shard(shard_id)
                .ok_or(ClientError::UnknownShard { shard: shard_id })?;
            let preceding_gaps = self.history.create_proxy(shard_id, self.id.index());
            tree.skip_transactions(self.id.history(), &preceding_gaps);
            let txn = tree.new_read_write_transaction(self.id);
            proxies.insert(
                shard_id,
                ProxyTransaction {
                    tree,
                    txn,
                    preceding_gaps,
                },
            );
        }
        let proxy = proxies
            .get_mut(&shard_id)
            .ok_or(ClientError::UnknownShard { shard: shard_id })?;
        Ok(f(proxy))
    }

    /// Returns the earlier history indices reported to `shard` when this
    /// transaction opened its proxy there.
    #[must_use]
    pub fn preceding_gaps(&self, shard: ShardId) -> Vec<u64> {
        self.proxies
            .lock()
            .get(&shard)
            .map(|proxy| proxy.preceding_gaps.clone())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for ClientTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientTransaction")
            .field("id", &self.id)
            .field("closed", &(self.state.load(Ordering::Acquire) == CLOSED))
            .finish_non_exhaustive()
    }
}
