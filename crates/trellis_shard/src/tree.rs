//! The per-shard commit pipeline.
//!
//! One [`ShardDataTree`] owns a shard's authoritative state, its speculative
//! (tentative) state, and the FIFO chain of pending transactions moving
//! through the three commit phases. All pipeline calls are serialized on one
//! internal lock; callbacks run after the lock is released and may re-enter
//! the pipeline, which is how callers chain phases back to back.

use crate::cohort::{
    AbortCallback, CanCommitCallback, CommitCallback, CompletionObserver, PreCommitCallback,
    ShardCohort,
};
use crate::config::ShardConfig;
use crate::error::{ShardError, ShardResult};
use crate::listener::{ListenerRegistry, RegistrationId, TreeChangeListener};
use crate::payload::{CommitPayload, StateSnapshot};
use crate::replication::ReplicationLog;
use crate::transaction::{ReadOnlyTransaction, ReadWriteTransaction};
use crate::types::{CommitSequence, HistoryId, TransactionId};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};
use trellis_tree::{
    Candidate, ModificationKind, Operation, Snapshot, TreeChange, TreePath,
};

enum Phase {
    Ready,
    CanCommitQueued(CanCommitCallback),
    CanCommitted,
    PreCommitted,
    CommitRequested(CommitCallback),
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::CanCommitQueued(_) => "can-commit-queued",
            Self::CanCommitted => "can-committed",
            Self::PreCommitted => "pre-committed",
            Self::CommitRequested(_) => "commit-requested",
        }
    }
}

struct ChainEntry {
    id: TransactionId,
    base: Snapshot,
    ops: Vec<Operation>,
    candidate: Candidate,
    phase: Phase,
    appended: bool,
    completion: Option<CompletionObserver>,
}

impl ChainEntry {
    fn pre_committed(&self) -> bool {
        matches!(self.phase, Phase::PreCommitted | Phase::CommitRequested(_))
    }
}

/// Deferred work collected under the lock and executed after it is released,
/// so callbacks are free to re-enter the pipeline.
enum Effect {
    Notify(Box<dyn FnOnce() + Send>),
    Append {
        id: TransactionId,
        payload: CommitPayload,
        batch_hint: bool,
    },
    AppendFailed {
        id: TransactionId,
        error: ShardError,
    },
}

fn notify(f: impl FnOnce() + Send + 'static) -> Effect {
    Effect::Notify(Box::new(f))
}

struct PipelineState {
    authoritative: Snapshot,
    tentative: Snapshot,
    chain: VecDeque<ChainEntry>,
    failed: HashMap<TransactionId, ShardError>,
    skipped: HashMap<HistoryId, BTreeSet<u64>>,
    next_sequence: CommitSequence,
}

impl PipelineState {
    /// Resolves queued canCommit callbacks whose chain predecessors have all
    /// reached preCommit. Eligibility is prefix-monotonic, so the scan stops
    /// at the first entry still short of preCommit.
    fn advance_can_commits(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        for index in 0..self.chain.len() {
            if !self.chain.iter().take(index).all(ChainEntry::pre_committed) {
                break;
            }
            let entry = &mut self.chain[index];
            if matches!(entry.phase, Phase::CanCommitQueued(_)) {
                if let Phase::CanCommitQueued(callback) =
                    std::mem::replace(&mut entry.phase, Phase::CanCommitted)
                {
                    trace!(txn = %entry.id, "canCommit unblocked");
                    effects.push(notify(move || callback(Ok(()))));
                }
            }
        }
        effects
    }

    /// Hands the chain's front run of commit-requested entries to the
    /// replication log. Each append but the last carries a batch hint.
    fn drain_appends(&mut self) -> Vec<Effect> {
        let start = self
            .chain
            .iter()
            .position(|entry| !entry.appended)
            .unwrap_or(self.chain.len());
        let mut batch = Vec::new();
        for index in start..self.chain.len() {
            let entry = &mut self.chain[index];
            if matches!(entry.phase, Phase::CommitRequested(_)) {
                entry.appended = true;
                batch.push((entry.id, entry.candidate.clone()));
            } else {
                break;
            }
        }

        let mut encoded = Vec::new();
        let mut failure = None;
        for (id, candidate) in batch {
            match CommitPayload::encode(id, &candidate) {
                Ok(payload) => encoded.push((id, payload)),
                Err(error) => {
                    failure = Some(Effect::AppendFailed { id, error });
                    break;
                }
            }
        }

        let count = encoded.len();
        let mut effects = Vec::new();
        for (index, (id, payload)) in encoded.into_iter().enumerate() {
            effects.push(Effect::Append {
                id,
                payload,
                batch_hint: index + 1 < count,
            });
        }
        effects.extend(failure);
        effects
    }

    /// Rebuilds tentative state from authoritative state by replaying every
    /// surviving chain entry in order. Entries that no longer validate are
    /// removed; their pending callbacks fire with the failure, or the failure
    /// is parked for the next phase call to pick up.
    fn rebase_chain(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        let mut tentative = self.authoritative.clone();
        let entries = std::mem::take(&mut self.chain);
        for mut entry in entries {
            match prepare_candidate(&tentative, &entry.base, &entry.ops) {
                Ok((candidate, result)) => {
                    entry.candidate = candidate;
                    tentative = result;
                    self.chain.push_back(entry);
                }
                Err(err) => {
                    let err = match err {
                        ShardError::ValidationConflict { path } => ShardError::rebase_failed(path),
                        other => other,
                    };
                    warn!(txn = %entry.id, %err, "transaction dropped during rebase");
                    match entry.phase {
                        Phase::CanCommitQueued(callback) => {
                            let e = err.clone();
                            effects.push(notify(move || callback(Err(e))));
                        }
                        Phase::CommitRequested(callback) => {
                            let e = err.clone();
                            effects.push(notify(move || callback(Err(e))));
                        }
                        Phase::Ready | Phase::CanCommitted | Phase::PreCommitted => {
                            self.failed.insert(entry.id, err.clone());
                        }
                    }
                    if let Some(completion) = entry.completion.take() {
                        let outcome = Err(err);
                        effects.push(notify(move || completion(&outcome)));
                    }
                }
            }
        }
        self.tentative = tentative;
        effects
    }
}

/// One shard's data tree and commit pipeline.
///
/// Finished transactions enter a FIFO pending chain and move through
/// canCommit, preCommit, and commit strictly in chain order. Commit effects
/// become visible in authoritative state only when the replication boundary
/// confirms the payload through [`apply_replicated_payload`].
///
/// [`apply_replicated_payload`]: ShardDataTree::apply_replicated_payload
pub struct ShardDataTree {
    config: ShardConfig,
    replication: Arc<dyn ReplicationLog>,
    // lock order: state before listeners
    state: Mutex<PipelineState>,
    listeners: Mutex<ListenerRegistry>,
}

impl ShardDataTree {
    /// Creates an empty shard backed by the given replication log.
    #[must_use]
    pub fn new(config: ShardConfig, replication: Arc<dyn ReplicationLog>) -> Arc<Self> {
        Arc::new(Self {
            config,
            replication,
            state: Mutex::new(PipelineState {
                authoritative: Snapshot::empty(),
                tentative: Snapshot::empty(),
                chain: VecDeque::new(),
                failed: HashMap::new(),
                skipped: HashMap::new(),
                next_sequence: CommitSequence::new(0),
            }),
            listeners: Mutex::new(ListenerRegistry::default()),
        })
    }

    /// Returns this shard's configuration.
    #[must_use]
    pub fn config(&self) -> &ShardConfig {
        &self.config
    }

    /// Returns the current authoritative snapshot.
    #[must_use]
    pub fn take_snapshot(&self) -> Snapshot {
        self.state.lock().authoritative.clone()
    }

    /// Returns the number of transactions pending in the chain.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().chain.len()
    }

    /// Opens a read-only transaction over current authoritative state.
    #[must_use]
    pub fn new_read_only_transaction(&self, id: TransactionId) -> ReadOnlyTransaction {
        ReadOnlyTransaction::new(id, self.take_snapshot())
    }

    /// Opens a read-write transaction based on current authoritative state.
    #[must_use]
    pub fn new_read_write_transaction(&self, id: TransactionId) -> ReadWriteTransaction {
        let snapshot = self.take_snapshot();
        ReadWriteTransaction::new(id, &snapshot)
    }

    /// Finishes a read-write transaction, validating it against tentative
    /// state and enqueueing it on the pending chain.
    ///
    /// A validation failure is not surfaced here; it is parked and reported
    /// when the returned cohort's canCommit runs, and the record is held
    /// until the cohort is aborted or [`purge_transaction`] is called. The
    /// optional completion observer fires exactly once with the
    /// transaction's final outcome.
    ///
    /// [`purge_transaction`]: ShardDataTree::purge_transaction
    ///
    /// # Errors
    ///
    /// Fails with [`ShardError::PipelineFull`] when the chain is at capacity.
    pub fn finish_transaction(
        self: &Arc<Self>,
        transaction: ReadWriteTransaction,
        completion: Option<CompletionObserver>,
    ) -> ShardResult<ShardCohort> {
        let (id, mut modification) = transaction.into_parts();
        modification.seal();

        let mut effects = Vec::new();
        {
            let mut state = self.state.lock();
            if state.chain.len() >= self.config.max_pending_transactions {
                return Err(ShardError::PipelineFull {
                    limit: self.config.max_pending_transactions,
                });
            }
            match prepare_candidate(&state.tentative, modification.base(), modification.operations())
            {
                Ok((candidate, result)) => {
                    debug!(shard = %self.config.shard_id, txn = %id, "transaction ready");
                    state.tentative = result;
                    state.chain.push_back(ChainEntry {
                        id,
                        base: modification.base().clone(),
                        ops: modification.operations().to_vec(),
                        candidate,
                        phase: Phase::Ready,
                        appended: false,
                        completion,
                    });
                }
                Err(err) => {
                    warn!(shard = %self.config.shard_id, txn = %id, %err, "transaction failed validation");
                    state.failed.insert(id, err.clone());
                    if let Some(completion) = completion {
                        let outcome = Err(err);
                        effects.push(notify(move || completion(&outcome)));
                    }
                }
            }
        }
        self.run_effects(effects);
        Ok(ShardCohort::new(Arc::clone(self), id))
    }

    /// Returns the pending candidate for `id`, if the transaction is still
    /// on the chain.
    #[must_use]
    pub fn candidate_for(&self, id: TransactionId) -> Option<Candidate> {
        self.state
            .lock()
            .chain
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.candidate.clone())
    }

    pub(crate) fn start_can_commit(&self, id: TransactionId, callback: CanCommitCallback) {
        let mut effects = Vec::new();
        {
            let mut state = self.state.lock();
            if let Some(err) = state.failed.get(&id).cloned() {
                effects.push(notify(move || callback(Err(err))));
            } else if let Some(index) = state.chain.iter().position(|entry| entry.id == id) {
                if matches!(state.chain[index].phase, Phase::Ready) {
                    let unblocked = state
                        .chain
                        .iter()
                        .take(index)
                        .all(ChainEntry::pre_committed);
                    if unblocked {
                        state.chain[index].phase = Phase::CanCommitted;
                        effects.push(notify(move || callback(Ok(()))));
                    } else {
                        trace!(txn = %id, predecessors = index, "canCommit queued");
                        state.chain[index].phase = Phase::CanCommitQueued(callback);
                    }
                } else {
                    let expected = "ready";
                    effects.push(notify(move || {
                        callback(Err(ShardError::InvalidPhase { id, expected }));
                    }));
                }
            } else {
                effects.push(notify(move || {
                    callback(Err(ShardError::UnknownTransaction { id }));
                }));
            }
        }
        self.run_effects(effects);
    }

    pub(crate) fn start_pre_commit(&self, id: TransactionId, callback: PreCommitCallback) {
        let mut effects = Vec::new();
        {
            let mut state = self.state.lock();
            if let Some(err) = state.failed.get(&id).cloned() {
                effects.push(notify(move || callback(Err(err))));
            } else if let Some(index) = state.chain.iter().position(|entry| entry.id == id) {
                if matches!(state.chain[index].phase, Phase::CanCommitted) {
                    state.chain[index].phase = Phase::PreCommitted;
                    let candidate = state.chain[index].candidate.clone();
                    debug!(shard = %self.config.shard_id, txn = %id, "pre-committed");
                    // successors unblock before the caller learns its own
                    // preCommit finished
                    effects.extend(state.advance_can_commits());
                    effects.push(notify(move || callback(Ok(candidate))));
                } else {
                    let expected = "can-committed";
                    effects.push(notify(move || {
                        callback(Err(ShardError::InvalidPhase { id, expected }));
                    }));
                }
            } else {
                effects.push(notify(move || {
                    callback(Err(ShardError::UnknownTransaction { id }));
                }));
            }
        }
        self.run_effects(effects);
    }

    pub(crate) fn start_commit(&self, id: TransactionId, callback: CommitCallback) {
        let mut effects = Vec::new();
        {
            let mut state = self.state.lock();
            if let Some(err) = state.failed.get(&id).cloned() {
                effects.push(notify(move || callback(Err(err))));
            } else if let Some(index) = state.chain.iter().position(|entry| entry.id == id) {
                if matches!(state.chain[index].phase, Phase::PreCommitted) {
                    state.chain[index].phase = Phase::CommitRequested(callback);
                    effects.extend(state.drain_appends());
                } else {
                    let expected = "pre-committed";
                    effects.push(notify(move || {
                        callback(Err(ShardError::InvalidPhase { id, expected }));
                    }));
                }
            } else {
                effects.push(notify(move || {
                    callback(Err(ShardError::UnknownTransaction { id }));
                }));
            }
        }
        self.run_effects(effects);
    }

    pub(crate) fn start_abort(&self, id: TransactionId, callback: AbortCallback) {
        let mut effects = Vec::new();
        {
            let mut state = self.state.lock();
            if state.failed.remove(&id).is_some() {
                effects.push(notify(move || callback(Ok(()))));
            } else if let Some(index) = state.chain.iter().position(|entry| entry.id == id) {
                if state.chain[index].appended {
                    let expected = "unreplicated";
                    effects.push(notify(move || {
                        callback(Err(ShardError::InvalidPhase { id, expected }));
                    }));
                } else if let Some(mut entry) = state.chain.remove(index) {
                    debug!(shard = %self.config.shard_id, txn = %id, phase = entry.phase.name(), "aborted");
                    effects.push(notify(move || callback(Ok(()))));
                    match entry.phase {
                        Phase::CanCommitQueued(pending) => {
                            effects.push(notify(move || pending(Err(ShardError::Aborted { id }))));
                        }
                        Phase::CommitRequested(pending) => {
                            effects.push(notify(move || pending(Err(ShardError::Aborted { id }))));
                        }
                        Phase::Ready | Phase::CanCommitted | Phase::PreCommitted => {}
                    }
                    if let Some(completion) = entry.completion.take() {
                        let outcome = Err(ShardError::Aborted { id });
                        effects.push(notify(move || completion(&outcome)));
                    }
                    effects.extend(state.rebase_chain());
                    effects.extend(state.advance_can_commits());
                    effects.extend(state.drain_appends());
                }
            } else {
                effects.push(notify(move || {
                    callback(Err(ShardError::UnknownTransaction { id }));
                }));
            }
        }
        self.run_effects(effects);
    }

    /// Applies one replicated payload coming back from the log.
    ///
    /// When `id` is the chain head, its locked-in candidate becomes part of
    /// authoritative state and the head's commit callback resolves with the
    /// assigned sequence. An unknown id against an empty chain is a foreign
    /// transaction replayed from the log; its payload is decoded and applied
    /// directly.
    ///
    /// # Errors
    ///
    /// Fails with [`ShardError::ChainCorrupted`] if `id` is pending but not
    /// at the chain head, or is unknown while transactions are pending.
    pub fn apply_replicated_payload(
        &self,
        id: TransactionId,
        payload: &CommitPayload,
    ) -> ShardResult<()> {
        let mut effects = Vec::new();
        {
            let mut state = self.state.lock();
            let head_matches = state.chain.front().is_some_and(|head| head.id == id);
            if head_matches {
                let confirmed = state
                    .chain
                    .front()
                    .is_some_and(|head| head.appended && matches!(head.phase, Phase::CommitRequested(_)));
                if !confirmed {
                    return Err(ShardError::chain_corrupted(format!(
                        "replicated {id} was never handed to the log"
                    )));
                }
                if let Some(mut entry) = state.chain.pop_front() {
                    let sequence = state.next_sequence;
                    state.next_sequence = sequence.next();
                    state.authoritative = entry.candidate.apply_to(&state.authoritative);
                    debug!(shard = %self.config.shard_id, txn = %id, %sequence, "committed");
                    if let Phase::CommitRequested(callback) = entry.phase {
                        effects.push(notify(move || callback(Ok(sequence))));
                    }
                    if let Some(completion) = entry.completion.take() {
                        let outcome = Ok(sequence);
                        effects.push(notify(move || completion(&outcome)));
                    }
                    effects.extend(self.listener_effects(&entry.candidate));
                }
            } else if state.chain.iter().any(|entry| entry.id == id) {
                return Err(ShardError::chain_corrupted(format!(
                    "replicated {id} out of order, chain head is {}",
                    state
                        .chain
                        .front()
                        .map_or_else(|| "empty".to_string(), |head| head.id.to_string())
                )));
            } else if state.chain.is_empty() {
                // a transaction committed elsewhere, replayed from the log
                let (_, candidate) = payload.decode()?;
                let sequence = state.next_sequence;
                state.next_sequence = sequence.next();
                state.authoritative = candidate.apply_to(&state.authoritative);
                state.tentative = state.authoritative.clone();
                debug!(shard = %self.config.shard_id, txn = %id, %sequence, "replayed foreign commit");
                effects.extend(self.listener_effects(&candidate));
            } else {
                return Err(ShardError::chain_corrupted(format!(
                    "replicated {id} unknown while transactions are pending"
                )));
            }
        }
        self.run_effects(effects);
        Ok(())
    }

    /// Serializes current authoritative state.
    ///
    /// # Errors
    ///
    /// Fails with [`ShardError::PayloadCodec`] if encoding fails.
    pub fn take_state_snapshot(&self) -> ShardResult<StateSnapshot> {
        StateSnapshot::encode(self.state.lock().authoritative.root())
    }

    /// Replaces authoritative state with a full snapshot from another
    /// instance, notifying listeners with the structural difference.
    ///
    /// # Errors
    ///
    /// Fails with [`ShardError::ChainNotEmpty`] while transactions are
    /// pending, or [`ShardError::PayloadCodec`] if the snapshot does not
    /// decode.
    pub fn apply_snapshot(&self, snapshot: &StateSnapshot) -> ShardResult<()> {
        let mut effects = Vec::new();
        {
            let mut state = self.state.lock();
            if !state.chain.is_empty() {
                return Err(ShardError::ChainNotEmpty {
                    pending: state.chain.len(),
                });
            }
            let root = snapshot.decode()?;
            let incoming = Snapshot::new(root);
            let diff = state.authoritative.diff(&incoming);
            state.authoritative = incoming.clone();
            state.tentative = incoming;
            debug!(shard = %self.config.shard_id, "installed state snapshot");
            if !diff.is_empty() {
                effects.extend(self.listener_effects(&diff));
            }
        }
        self.run_effects(effects);
        Ok(())
    }

    /// Registers a listener for committed changes under `path`.
    ///
    /// With `notify_initial`, the listener first receives a synthetic write
    /// describing the subtree's current state, if it exists.
    pub fn register_tree_change_listener(
        &self,
        path: TreePath,
        listener: Arc<dyn TreeChangeListener>,
        notify_initial: bool,
    ) -> RegistrationId {
        let mut effects = Vec::new();
        let id = {
            let state = self.state.lock();
            let mut listeners = self.listeners.lock();
            let id = listeners.register(path.clone(), Arc::clone(&listener));
            if notify_initial {
                if let Some(node) = state.authoritative.read(&path) {
                    let change = TreeChange {
                        path,
                        kind: ModificationKind::Write,
                        after: Some(node),
                    };
                    effects.push(notify(move || listener.on_tree_changed(&[change])));
                }
            }
            id
        };
        self.run_effects(effects);
        id
    }

    /// Removes a listener registration. Returns whether it was present.
    pub fn unregister_tree_change_listener(&self, id: RegistrationId) -> bool {
        self.listeners.lock().unregister(id)
    }

    /// Drops the parked failure record for `id`, if any.
    ///
    /// A finish-time or rebase failure stays parked and is re-reported by
    /// every later phase call; it is released only here or by aborting the
    /// transaction.
    pub fn purge_transaction(&self, id: TransactionId) {
        self.state.lock().failed.remove(&id);
    }

    /// Records transaction indices of `history` that will never be submitted
    /// to this shard, so the shard can account for the history's full index
    /// sequence.
    pub fn skip_transactions(&self, history: HistoryId, indices: &[u64]) {
        if indices.is_empty() {
            return;
        }
        debug!(shard = %self.config.shard_id, %history, ?indices, "recorded skipped transactions");
        self.state
            .lock()
            .skipped
            .entry(history)
            .or_default()
            .extend(indices.iter().copied());
    }

    /// Returns the indices recorded as skipped for `history`, in order.
    #[must_use]
    pub fn skipped_transactions(&self, history: HistoryId) -> Vec<u64> {
        self.state
            .lock()
            .skipped
            .get(&history)
            .map(|indices| indices.iter().copied().collect())
            .unwrap_or_default()
    }

    fn listener_effects(&self, candidate: &Candidate) -> Vec<Effect> {
        self.listeners
            .lock()
            .deliveries_for(candidate)
            .into_iter()
            .map(|(listener, changes)| notify(move || listener.on_tree_changed(&changes)))
            .collect()
    }

    fn fail_append(&self, id: TransactionId, error: ShardError) -> Vec<Effect> {
        let mut effects = Vec::new();
        let mut state = self.state.lock();
        let Some(index) = state.chain.iter().position(|entry| entry.id == id) else {
            return effects;
        };
        let Some(mut entry) = state.chain.remove(index) else {
            return effects;
        };
        warn!(shard = %self.config.shard_id, txn = %id, %error, "replication append failed");
        if let Phase::CommitRequested(callback) = entry.phase {
            let err = error.clone();
            effects.push(notify(move || callback(Err(err))));
        }
        if let Some(completion) = entry.completion.take() {
            let outcome = Err(error);
            effects.push(notify(move || completion(&outcome)));
        }
        // successors marked in the same batch never reached the log
        for later in state.chain.iter_mut().skip(index) {
            later.appended = false;
        }
        effects.extend(state.rebase_chain());
        effects.extend(state.advance_can_commits());
        effects.extend(state.drain_appends());
        effects
    }

    fn run_effects(&self, effects: Vec<Effect>) {
        let mut queue: VecDeque<Effect> = effects.into();
        loop {
            // queued appends reach the log before any callback runs; a
            // re-entrant callback would otherwise drain newer entries past
            // them, handing payloads to the log out of chain order
            let index = queue
                .iter()
                .position(|effect| !matches!(effect, Effect::Notify(_)))
                .unwrap_or(0);
            let Some(effect) = queue.remove(index) else {
                break;
            };
            match effect {
                Effect::Notify(callback) => callback(),
                Effect::Append {
                    id,
                    payload,
                    batch_hint,
                } => {
                    trace!(txn = %id, batch_hint, "handing payload to replication");
                    if let Err(err) = self.replication.append(id, payload, batch_hint) {
                        // the rest of this batch is stale once the chain is
                        // rebased; a fresh drain re-appends survivors
                        queue.retain(|pending| matches!(pending, Effect::Notify(_)));
                        queue.extend(self.fail_append(
                            id,
                            ShardError::replication_failed(err.to_string()),
                        ));
                    }
                }
                Effect::AppendFailed { id, error } => {
                    queue.retain(|pending| matches!(pending, Effect::Notify(_)));
                    queue.extend(self.fail_append(id, error));
                }
            }
        }
    }
}

impl fmt::Debug for ShardDataTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardDataTree")
            .field("shard", &self.config.shard_id)
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

/// Validates a finished transaction's operations against tentative state and
/// derives its candidate.
///
/// Writes and deletes carry an optimistic precondition: the value at the
/// target path must be unchanged between the transaction's base snapshot and
/// tentative state, unless an earlier operation of the same transaction
/// already touched an overlapping path. Writes additionally require the
/// parent path to exist. Merges create missing ancestors and never conflict.
fn prepare_candidate(
    tentative: &Snapshot,
    base: &Snapshot,
    ops: &[Operation],
) -> ShardResult<(Candidate, Snapshot)> {
    let mut working = tentative.new_modification();
    let mut touched: Vec<TreePath> = Vec::new();
    for op in ops {
        let self_overlap = touched.iter().any(|prior| prior.intersects(op.path()));
        match op {
            Operation::Write { path, node } => {
                if !self_overlap && base.read(path) != working.read(path) {
                    return Err(ShardError::validation_conflict(path.clone()));
                }
                if let Some(parent) = path.parent() {
                    if !working.exists(&parent) {
                        return Err(ShardError::validation_conflict(path.clone()));
                    }
                }
                working.write(path.clone(), Arc::clone(node))?;
            }
            Operation::Merge { path, node } => {
                working.merge(path.clone(), Arc::clone(node))?;
            }
            Operation::Delete { path } => {
                if !self_overlap && base.read(path) != working.read(path) {
                    return Err(ShardError::validation_conflict(path.clone()));
                }
                working.delete(path.clone())?;
            }
        }
        touched.push(op.path().clone());
    }
    working.seal();
    let candidate = working.to_candidate()?;
    let result = working.result();
    Ok((candidate, result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::RecordingLog;
    use crate::types::HistoryId;
    use trellis_tree::TreeNode;

    fn path(segments: &[&str]) -> TreePath {
        TreePath::new(segments.iter().copied())
    }

    fn leaf(byte: u8) -> Arc<TreeNode> {
        Arc::new(TreeNode::leaf([byte]))
    }

    fn test_tree(limit: usize) -> Arc<ShardDataTree> {
        let config = crate::ShardConfig::new(crate::ShardId::new(0))
            .name("test")
            .max_pending_transactions(limit);
        ShardDataTree::new(config, Arc::new(RecordingLog::new()))
    }

    #[test]
    fn prepare_detects_concurrent_write() {
        let tentative = {
            let mut m = Snapshot::empty().new_modification();
            m.write(path(&["cars"]), leaf(1)).unwrap();
            m.result()
        };
        let base = Snapshot::empty();
        let ops = vec![Operation::Write {
            path: path(&["cars"]),
            node: leaf(2),
        }];
        let err = prepare_candidate(&tentative, &base, &ops).unwrap_err();
        assert_eq!(err, ShardError::validation_conflict(path(&["cars"])));
    }

    #[test]
    fn prepare_requires_parent_for_writes() {
        let base = Snapshot::empty();
        let ops = vec![Operation::Write {
            path: path(&["cars", "optima"]),
            node: leaf(1),
        }];
        let err = prepare_candidate(&Snapshot::empty(), &base, &ops).unwrap_err();
        assert_eq!(
            err,
            ShardError::validation_conflict(path(&["cars", "optima"]))
        );
    }

    #[test]
    fn prepare_skips_checks_for_self_overlap() {
        let base = Snapshot::empty();
        let ops = vec![
            Operation::Write {
                path: path(&["cars"]),
                node: leaf(1),
            },
            Operation::Write {
                path: path(&["cars", "optima"]),
                node: leaf(2),
            },
        ];
        let (candidate, result) = prepare_candidate(&Snapshot::empty(), &base, &ops).unwrap();
        assert!(!candidate.is_empty());
        assert!(result.exists(&path(&["cars", "optima"])));
    }

    #[test]
    fn prepare_allows_merge_without_ancestors() {
        let ops = vec![Operation::Merge {
            path: path(&["cars", "list"]),
            node: leaf(1),
        }];
        let (_, result) = prepare_candidate(&Snapshot::empty(), &Snapshot::empty(), &ops).unwrap();
        assert!(result.exists(&path(&["cars", "list"])));
    }

    #[test]
    fn prepare_tolerates_delete_of_absent_path() {
        let ops = vec![Operation::Delete {
            path: path(&["cars"]),
        }];
        let (candidate, _) = prepare_candidate(&Snapshot::empty(), &Snapshot::empty(), &ops).unwrap();
        assert!(candidate.is_empty());
    }

    #[test]
    fn skipped_indices_recorded_per_history() {
        let tree = test_tree(4);
        let history = HistoryId::random();
        tree.skip_transactions(history, &[0, 2]);
        tree.skip_transactions(history, &[1]);
        assert_eq!(tree.skipped_transactions(history), vec![0, 1, 2]);
        assert!(tree.skipped_transactions(HistoryId::random()).is_empty());
    }

    #[test]
    fn pipeline_rejects_when_full() {
        let tree = test_tree(1);
        let history = HistoryId::random();

        let mut t1 = tree.new_read_write_transaction(TransactionId::new(history, 0));
        t1.write(path(&["cars"]), leaf(1)).unwrap();
        tree.finish_transaction(t1, None).unwrap();

        let mut t2 = tree.new_read_write_transaction(TransactionId::new(history, 1));
        t2.write(path(&["people"]), leaf(2)).unwrap();
        let err = tree.finish_transaction(t2, None).unwrap_err();
        assert_eq!(err, ShardError::PipelineFull { limit: 1 });
    }
}
