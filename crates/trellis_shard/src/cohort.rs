//! Three-phase commit cohorts.

use crate::error::ShardResult;
use crate::tree::ShardDataTree;
use crate::types::{CommitSequence, TransactionId};
use std::sync::Arc;
use trellis_tree::Candidate;

/// Callback resolved when canCommit completes.
pub type CanCommitCallback = Box<dyn FnOnce(ShardResult<()>) + Send>;
/// Callback resolved when preCommit completes, carrying the candidate.
pub type PreCommitCallback = Box<dyn FnOnce(ShardResult<Candidate>) + Send>;
/// Callback resolved when the commit is applied, carrying the sequence.
pub type CommitCallback = Box<dyn FnOnce(ShardResult<CommitSequence>) + Send>;
/// Callback resolved when an abort completes.
pub type AbortCallback = Box<dyn FnOnce(ShardResult<()>) + Send>;
/// Observer invoked with the transaction's final outcome, success or failure.
pub type CompletionObserver = Box<dyn FnOnce(&ShardResult<CommitSequence>) + Send>;

/// Handle driving one finished transaction through the commit phases.
///
/// Phases must be driven in order: canCommit, preCommit, commit. Each phase
/// resolves asynchronously through its callback; a phase may stay queued
/// behind chain predecessors. Abort is accepted in any phase before the
/// payload has been handed to replication.
#[derive(Clone)]
pub struct ShardCohort {
    tree: Arc<ShardDataTree>,
    id: TransactionId,
}

impl ShardCohort {
    pub(crate) fn new(tree: Arc<ShardDataTree>, id: TransactionId) -> Self {
        Self { tree, id }
    }

    /// Returns the transaction id this cohort drives.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Starts the canCommit phase.
    ///
    /// Resolves once every chain predecessor has reached preCommit; a
    /// finish-time validation failure surfaces here.
    pub fn can_commit(&self, callback: CanCommitCallback) {
        self.tree.start_can_commit(self.id, callback);
    }

    /// Starts the preCommit phase, locking in this transaction's candidate.
    pub fn pre_commit(&self, callback: PreCommitCallback) {
        self.tree.start_pre_commit(self.id, callback);
    }

    /// Starts the commit phase, handing the payload to replication.
    pub fn commit(&self, callback: CommitCallback) {
        self.tree.start_commit(self.id, callback);
    }

    /// Aborts the transaction and rebases any chain successors.
    pub fn abort(&self, callback: AbortCallback) {
        self.tree.start_abort(self.id, callback);
    }

    /// Returns the transaction's current candidate, if it is still pending.
    #[must_use]
    pub fn candidate(&self) -> Option<Candidate> {
        self.tree.candidate_for(self.id)
    }
}

impl std::fmt::Debug for ShardCohort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardCohort").field("id", &self.id).finish()
    }
}
