//! Cross-shard commit cohorts.

use crate::error::{ClientError, ClientResult};
use parking_lot::Mutex;
use std::sync::Arc;
use trellis_shard::{ShardCohort, TransactionId};

/// Callback resolved when a fanned-out phase completes on every participant.
pub type CohortCallback = Box<dyn FnOnce(ClientResult<()>) + Send>;

/// The commit handle of one readied client transaction.
///
/// The variant is chosen by how many shards the transaction touched. An
/// empty cohort has nothing to commit and resolves every phase immediately.
/// A direct cohort delegates to its single shard. A multi cohort fans each
/// phase out to every participant and resolves once all have answered,
/// reporting the first failure; a canCommit or preCommit failure aborts the
/// surviving participants.
pub enum ClientCohort {
    /// The transaction touched no shard.
    Empty {
        /// The transaction.
        id: TransactionId,
    },
    /// The transaction touched exactly one shard.
    Direct {
        /// The transaction.
        id: TransactionId,
        /// The single shard's cohort.
        cohort: ShardCohort,
    },
    /// The transaction touched several shards.
    Multi {
        /// The transaction.
        id: TransactionId,
        /// Per-shard cohorts, ordered by shard id.
        participants: Vec<ShardCohort>,
    },
}

impl ClientCohort {
    pub(crate) fn new(id: TransactionId, mut participants: Vec<ShardCohort>) -> Self {
        match participants.len() {
            0 => Self::Empty { id },
            1 => Self::Direct {
                id,
                cohort: participants.remove(0),
            },
            _ => Self::Multi { id, participants },
        }
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        match self {
            Self::Empty { id } | Self::Direct { id, .. } | Self::Multi { id, .. } => *id,
        }
    }

    /// Returns the number of participating shards.
    #[must_use]
    pub fn participant_count(&self) -> usize {
        match self {
            Self::Empty { .. } => 0,
            Self::Direct { .. } => 1,
            Self::Multi { participants, .. } => participants.len(),
        }
    }

    /// Starts canCommit on every participant.
    pub fn can_commit(&self, callback: CohortCallback) {
        match self {
            Self::Empty { .. } => callback(Ok(())),
            Self::Direct { cohort, .. } => {
                cohort.can_commit(Box::new(move |result| callback(result.map_err(Into::into))));
            }
            Self::Multi { participants, .. } => {
                let join = Join::new(participants, callback, true);
                for cohort in participants {
                    let join = join.clone();
                    cohort.can_commit(Box::new(move |result| {
                        join.settle(result.map_err(Into::into));
                    }));
                }
            }
        }
    }

    /// Starts preCommit on every participant.
    pub fn pre_commit(&self, callback: CohortCallback) {
        match self {
            Self::Empty { .. } => callback(Ok(())),
            Self::Direct { cohort, .. } => {
                cohort.pre_commit(Box::new(move |result| {
                    callback(result.map(drop).map_err(Into::into));
                }));
            }
            Self::Multi { participants, .. } => {
                let join = Join::new(participants, callback, true);
                for cohort in participants {
                    let join = join.clone();
                    cohort.pre_commit(Box::new(move |result| {
                        join.settle(result.map(drop).map_err(Into::into));
                    }));
                }
            }
        }
    }

    /// Starts the final commit on every participant.
    pub fn commit(&self, callback: CohortCallback) {
        match self {
            Self::Empty { .. } => callback(Ok(())),
            Self::Direct { cohort, .. } => {
                cohort.commit(Box::new(move |result| {
                    callback(result.map(drop).map_err(Into::into));
                }));
            }
            Self::Multi { participants, .. } => {
                // past this point a participant failure cannot be undone by
                // aborting the others
                let join = Join::new(participants, callback, false);
                for cohort in participants {
                    let join = join.clone();
                    cohort.commit(Box::new(move |result| {
                        join.settle(result.map(drop).map_err(Into::into));
                    }));
                }
            }
        }
    }

    /// Aborts every participant.
    pub fn abort(&self, callback: CohortCallback) {
        match self {
            Self::Empty { .. } => callback(Ok(())),
            Self::Direct { cohort, .. } => {
                cohort.abort(Box::new(move |result| callback(result.map_err(Into::into))));
            }
            Self::Multi { participants, .. } => {
                let join = Join::new(participants, callback, false);
                for cohort in participants {
                    let join = join.clone();
                    cohort.abort(Box::new(move |result| {
                        join.settle(result.map_err(Into::into));
                    }));
                }
            }
        }
    }
}

impl std::fmt::Debug for ClientCohort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCohort")
            .field("id", &self.id())
            .field("participants", &self.participant_count())
            .finish()
    }
}

struct JoinState {
    remaining: usize,
    failure: Option<ClientError>,
    callback: Option<CohortCallback>,
}

/// Aggregates one phase's per-participant results into a single resolution.
#[derive(Clone)]
struct Join {
    state: Arc<Mutex<JoinState>>,
    participants: Vec<ShardCohort>,
    abort_on_failure: bool,
}

impl Join {
    fn new(participants: &[ShardCohort], callback: CohortCallback, abort_on_failure: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(JoinState {
                remaining: participants.len(),
                failure: None,
                callback: Some(callback),
            })),
            participants: participants.to_vec(),
            abort_on_failure,
        }
    }

    fn settle(&self, result: ClientResult<()>) {
        let mut state = self.state.lock();
        if let Err(err) = result {
            if state.failure.is_none() {
                state.failure = Some(err);
            }
        }
        state.remaining -= 1;
        if state.remaining > 0 {
            return;
        }
        let callback = state.callback.take();
        let failure = state.failure.take();
        drop(state);

        match failure {
            Some(err) => {
                if self.abort_on_failure {
                    for cohort in &self.participants {
                        cohort.abort(Box::new(|_| {}));
                    }
                }
                if let Some(callback) = callback {
                    callback(Err(err));
                }
            }
            None => {
                if let Some(callback) = callback {
                    callback(Ok(()));
                }
            }
        }
    }
}
