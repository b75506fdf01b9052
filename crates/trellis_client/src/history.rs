//! Client transaction histories.

use crate::resolver::ShardResolver;
use crate::transaction::ClientTransaction;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use trellis_shard::{HistoryId, ShardId, TransactionId};

#[derive(Default)]
struct ShardRecord {
    last_sent: Option<u64>,
    skipped: BTreeSet<u64>,
}

/// One client's ordered stream of transactions.
///
/// Transaction indices are allocated history-wide, but a transaction only
/// reaches the shards it touches. The history records, per shard, which
/// indices that shard will never see, and reports them the next time a
/// transaction opens a proxy there, so every shard can account for the full
/// index sequence.
pub struct ClientHistory {
    id: HistoryId,
    resolver: Arc<dyn ShardResolver>,
    next_index: AtomicU64,
    records: Mutex<HashMap<ShardId, ShardRecord>>,
}

impl ClientHistory {
    /// Creates a history with a fresh random id.
    #[must_use]
    pub fn new(resolver: Arc<dyn ShardResolver>) -> Arc<Self> {
        Self::with_id(HistoryId::random(), resolver)
    }

    /// Creates a history with a caller-chosen id.
    #[must_use]
    pub fn with_id(id: HistoryId, resolver: Arc<dyn ShardResolver>) -> Arc<Self> {
        Arc::new(Self {
            id,
            resolver,
            next_index: AtomicU64::new(0),
            records: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the history id.
    #[must_use]
    pub fn id(&self) -> HistoryId {
        self.id
    }

    pub(crate) fn resolver(&self) -> &Arc<dyn ShardResolver> {
        &self.resolver
    }

    /// Opens the next transaction in this history.
    #[must_use]
    pub fn new_transaction(self: &Arc<Self>) -> ClientTransaction {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        ClientTransaction::new(TransactionId::new(self.id, index), Arc::clone(self))
    }

    /// Records that transaction `index` is reaching `shard`, and drains the
    /// earlier indices that shard never saw.
    pub(crate) fn create_proxy(&self, shard: ShardId, index: u64) -> Vec<u64> {
        let mut records = self.records.lock();
        let record = records.entry(shard).or_default();
        let retained = record.skipped.split_off(&index);
        let gaps: Vec<u64> = std::mem::replace(&mut record.skipped, retained)
            .into_iter()
            .collect();
        record.last_sent = Some(index);
        if !gaps.is_empty() {
            debug!(history = %self.id, %shard, ?gaps, "reporting skipped transactions");
        }
        gaps
    }

    /// Records that transaction `index` closed without touching any shard
    /// outside `touched`.
    pub(crate) fn on_transaction_closed(&self, index: u64, touched: &[ShardId]) {
        let mut records = self.records.lock();
        for shard in self.resolver.shard_ids() {
            if !touched.contains(&shard) {
                records.entry(shard).or_default().skipped.insert(index);
            }
        }
    }

    /// Returns the indices `shard` has not seen and has not yet been told
    /// about.
    #[must_use]
    pub fn skipped_for(&self, shard: ShardId) -> Vec<u64> {
        self.records
            .lock()
            .get(&shard)
            .map(|record| record.skipped.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Returns the last transaction index sent to `shard`, if any.
    #[must_use]
    pub fn last_sent_to(&self, shard: ShardId) -> Option<u64> {
        self.records.lock().get(&shard).and_then(|record| record.last_sent)
    }
}

impl std::fmt::Debug for ClientHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHistory").field("id", &self.id).finish_non_exhaustive()
    }
}
