//! Client fan-out tests: cohort selection, cross-shard commits, failure
//! handling, and transaction-index gap tracking.

use parking_lot::Mutex;
use std::sync::Arc;
use trellis_client::{
    ClientCohort, ClientError, ClientHistory, ClientResult, PrefixResolver,
};
use trellis_shard::{LoopbackLog, ShardConfig, ShardDataTree, ShardError, ShardId};
use trellis_tree::{TreeNode, TreePath};

const CARS_SHARD: ShardId = ShardId::new(1);
const PEOPLE_SHARD: ShardId = ShardId::new(2);

fn path(segments: &[&str]) -> TreePath {
    TreePath::new(segments.iter().copied())
}

fn leaf(byte: u8) -> Arc<TreeNode> {
    Arc::new(TreeNode::leaf([byte]))
}

fn loopback_shard(id: ShardId) -> Arc<ShardDataTree> {
    let log = Arc::new(LoopbackLog::new());
    let tree = ShardDataTree::new(ShardConfig::new(id), log.clone());
    log.attach(&tree);
    tree
}

fn setup() -> (Arc<ClientHistory>, Arc<ShardDataTree>, Arc<ShardDataTree>) {
    let cars = loopback_shard(CARS_SHARD);
    let people = loopback_shard(PEOPLE_SHARD);
    let resolver = PrefixResolver::new(CARS_SHARD)
        .with_shard(CARS_SHARD, cars.clone())
        .with_shard(PEOPLE_SHARD, people.clone())
        .with_route("people", PEOPLE_SHARD);
    let history = ClientHistory::new(Arc::new(resolver));
    (history, cars, people)
}

struct Capture(Arc<Mutex<Option<ClientResult<()>>>>);

impl Capture {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(None)))
    }

    fn callback(&self) -> Box<dyn FnOnce(ClientResult<()>) + Send> {
        let slot = Arc::clone(&self.0);
        Box::new(move |result| {
            *slot.lock() = Some(result);
        })
    }

    fn get(&self) -> ClientResult<()> {
        self.0.lock().clone().expect("callback never invoked")
    }
}

fn drive_to_commit(cohort: &ClientCohort) -> ClientResult<()> {
    let cc = Capture::new();
    cohort.can_commit(cc.callback());
    cc.get()?;
    let pc = Capture::new();
    cohort.pre_commit(pc.callback());
    pc.get()?;
    let c = Capture::new();
    cohort.commit(c.callback());
    c.get()
}

#[test]
fn empty_cohort_for_untouched_transaction() {
    let (history, _, _) = setup();
    let txn = history.new_transaction();
    let cohort = txn.ready().unwrap();
    assert!(matches!(cohort, ClientCohort::Empty { .. }));
    assert_eq!(cohort.participant_count(), 0);
    assert!(drive_to_commit(&cohort).is_ok());
}

#[test]
fn direct_cohort_for_single_shard() {
    let (history, cars, people) = setup();
    let txn = history.new_transaction();
    txn.write(path(&["cars"]), leaf(1)).unwrap();
    let cohort = txn.ready().unwrap();
    assert!(matches!(cohort, ClientCohort::Direct { .. }));

    drive_to_commit(&cohort).unwrap();
    assert_eq!(cars.take_snapshot().read(&path(&["cars"])), Some(leaf(1)));
    assert_eq!(people.pending_count(), 0);
}

#[test]
fn multi_cohort_commits_across_shards() {
    let (history, cars, people) = setup();
    let txn = history.new_transaction();
    txn.write(path(&["cars"]), leaf(1)).unwrap();
    txn.write(path(&["people"]), leaf(2)).unwrap();
    let cohort = txn.ready().unwrap();
    assert!(matches!(cohort, ClientCohort::Multi { .. }));
    assert_eq!(cohort.participant_count(), 2);

    drive_to_commit(&cohort).unwrap();
    assert_eq!(cars.take_snapshot().read(&path(&["cars"])), Some(leaf(1)));
    assert_eq!(people.take_snapshot().read(&path(&["people"])), Some(leaf(2)));
}

#[test]
fn multi_can_commit_failure_aborts_all_participants() {
    let (history, cars, people) = setup();

    // the second transaction bases on the same empty snapshot, so the
    // first's commit invalidates its write
    let first = history.new_transaction();
    first.write(path(&["cars"]), leaf(1)).unwrap();
    let second = history.new_transaction();
    second.write(path(&["cars"]), leaf(2)).unwrap();
    second.write(path(&["people"]), leaf(3)).unwrap();

    drive_to_commit(&first.ready().unwrap()).unwrap();

    let cohort = second.ready().unwrap();
    let cc = Capture::new();
    cohort.can_commit(cc.callback());
    assert_eq!(
        cc.get(),
        Err(ClientError::Shard(ShardError::ValidationConflict {
            path: path(&["cars"]),
        }))
    );

    // the healthy participant was aborted along with the failed one
    assert_eq!(people.pending_count(), 0);
    assert_eq!(cars.pending_count(), 0);
    assert_eq!(cars.take_snapshot().read(&path(&["cars"])), Some(leaf(1)));
    assert!(!people.take_snapshot().exists(&path(&["people"])));
}

#[test]
fn closed_transaction_rejects_operations() {
    let (history, _, _) = setup();
    let txn = history.new_transaction();
    txn.write(path(&["cars"]), leaf(1)).unwrap();
    let id = txn.id();

    txn.abort();
    txn.abort();
    assert_eq!(
        txn.write(path(&["cars"]), leaf(2)),
        Err(ClientError::Closed { id })
    );
    assert_eq!(txn.ready().unwrap_err(), ClientError::Closed { id });
}

#[test]
fn reads_observe_own_writes() {
    let (history, _, _) = setup();
    let txn = history.new_transaction();
    assert_eq!(txn.read(&path(&["cars"])).unwrap(), None);
    txn.write(path(&["cars"]), leaf(7)).unwrap();
    assert_eq!(txn.read(&path(&["cars"])).unwrap(), Some(leaf(7)));
    assert!(!txn.exists(&path(&["people"])).unwrap());
    txn.abort();
}

#[test]
fn unrouted_shard_is_an_error() {
    let cars = loopback_shard(CARS_SHARD);
    let resolver = PrefixResolver::new(CARS_SHARD)
        .with_shard(CARS_SHARD, cars)
        .with_route("ghost", ShardId::new(9));
    let history = ClientHistory::new(Arc::new(resolver));

    let txn = history.new_transaction();
    assert_eq!(
        txn.write(path(&["ghost"]), leaf(1)),
        Err(ClientError::UnknownShard {
            shard: ShardId::new(9),
        })
    );
}

#[test]
fn gaps_reported_when_a_shard_is_skipped() {
    let (history, _, people) = setup();

    // two transactions that never reach the people shard
    for byte in [1u8, 2] {
        let txn = history.new_transaction();
        txn.write(path(&["cars"]), leaf(byte)).unwrap();
        txn.abort();
    }
    assert_eq!(history.skipped_for(PEOPLE_SHARD), vec![0, 1]);

    // the next transaction to touch it carries the gap report to the shard
    let txn = history.new_transaction();
    txn.write(path(&["people"]), leaf(3)).unwrap();
    assert_eq!(txn.preceding_gaps(PEOPLE_SHARD), vec![0, 1]);
    assert_eq!(people.skipped_transactions(history.id()), vec![0, 1]);
    assert!(history.skipped_for(PEOPLE_SHARD).is_empty());
    assert_eq!(history.last_sent_to(PEOPLE_SHARD), Some(2));
    txn.abort();
}

#[test]
fn failed_ready_releases_sealed_participants() {
    let cars = loopback_shard(CARS_SHARD);
    let people_log = Arc::new(LoopbackLog::new());
    let people = ShardDataTree::new(
        ShardConfig::new(PEOPLE_SHARD).max_pending_transactions(0),
        people_log.clone(),
    );
    people_log.attach(&people);
    let resolver = PrefixResolver::new(CARS_SHARD)
        .with_shard(CARS_SHARD, cars.clone())
        .with_shard(PEOPLE_SHARD, people.clone())
        .with_route("people", PEOPLE_SHARD);
    let history = ClientHistory::new(Arc::new(resolver));

    let txn = history.new_transaction();
    txn.write(path(&["cars"]), leaf(1)).unwrap();
    txn.write(path(&["people"]), leaf(2)).unwrap();

    // the people shard rejects its part; the entry already sealed onto the
    // cars shard must not stay queued there
    assert_eq!(
        txn.ready().unwrap_err(),
        ClientError::Shard(ShardError::PipelineFull { limit: 0 })
    );
    assert_eq!(cars.pending_count(), 0);
    assert_eq!(people.pending_count(), 0);
}

#[test]
fn aborted_transaction_is_skipped_everywhere() {
    let (history, _, _) = setup();
    let txn = history.new_transaction();
    txn.write(path(&["cars"]), leaf(1)).unwrap();
    txn.abort();

    assert_eq!(history.skipped_for(CARS_SHARD), vec![0]);
    assert_eq!(history.skipped_for(PEOPLE_SHARD), vec![0]);
}
