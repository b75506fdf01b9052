//! Tree-change listeners.

use std::sync::mpsc::Sender;
use std::sync::Arc;
use trellis_tree::{Candidate, TreeChange, TreePath};

/// Observer of committed changes under a registered subtree.
///
/// Listeners are invoked after a transaction's effects have been applied to
/// authoritative state, in commit order, and never for speculative
/// (tentative) state. A commit that leaves the registered subtree untouched
/// produces no invocation.
pub trait TreeChangeListener: Send + Sync {
    /// Called with the changes of one committed transaction that intersect
    /// the registered subtree.
    fn on_tree_changed(&self, changes: &[TreeChange]);
}

/// Handle identifying one listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(u64);

struct ListenerEntry {
    id: RegistrationId,
    path: TreePath,
    listener: Arc<dyn TreeChangeListener>,
}

/// Set of registered listeners with per-candidate change filtering.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: u64,
    entries: Vec<ListenerEntry>,
}

impl ListenerRegistry {
    pub(crate) fn register(
        &mut self,
        path: TreePath,
        listener: Arc<dyn TreeChangeListener>,
    ) -> RegistrationId {
        let id = RegistrationId(self.next_id);
        self.next_id += 1;
        self.entries.push(ListenerEntry { id, path, listener });
        id
    }

    pub(crate) fn unregister(&mut self, id: RegistrationId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    /// Collects, per listener, the candidate's changes that intersect its
    /// registered subtree. Listeners with no intersecting change are skipped.
    pub(crate) fn deliveries_for(
        &self,
        candidate: &Candidate,
    ) -> Vec<(Arc<dyn TreeChangeListener>, Vec<TreeChange>)> {
        let changes = candidate.changes();
        let mut deliveries = Vec::new();
        for entry in &self.entries {
            let matching: Vec<TreeChange> = changes
                .iter()
                .filter(|change| change.path.intersects(&entry.path))
                .cloned()
                .collect();
            if !matching.is_empty() {
                deliveries.push((Arc::clone(&entry.listener), matching));
            }
        }
        deliveries
    }
}

/// Listener adapter forwarding each delivery into an mpsc channel.
pub struct ChannelListener {
    sender: Sender<Vec<TreeChange>>,
}

impl ChannelListener {
    /// Wraps a channel sender as a listener.
    #[must_use]
    pub fn new(sender: Sender<Vec<TreeChange>>) -> Self {
        Self { sender }
    }
}

impl TreeChangeListener for ChannelListener {
    fn on_tree_changed(&self, changes: &[TreeChange]) {
        // receiver may have gone away; deliveries are best-effort
        let _ = self.sender.send(changes.to_vec());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use trellis_tree::{Snapshot, TreeNode};

    fn path(segments: &[&str]) -> TreePath {
        TreePath::new(segments.iter().copied())
    }

    fn candidate_writing(segments: &[&str]) -> Candidate {
        let mut modification = Snapshot::empty().new_modification();
        modification
            .write(path(segments), Arc::new(TreeNode::leaf([1u8])))
            .unwrap();
        modification.seal();
        modification.to_candidate().unwrap()
    }

    #[test]
    fn deliveries_filter_by_subtree() {
        let mut registry = ListenerRegistry::default();
        let (tx, rx) = mpsc::channel();
        registry.register(path(&["cars"]), Arc::new(ChannelListener::new(tx)));

        let deliveries = registry.deliveries_for(&candidate_writing(&["cars", "optima"]));
        assert_eq!(deliveries.len(), 1);
        for (listener, changes) in deliveries {
            listener.on_tree_changed(&changes);
        }
        let received = rx.try_recv().unwrap();
        assert_eq!(received.len(), 1);

        let deliveries = registry.deliveries_for(&candidate_writing(&["people", "alice"]));
        assert!(deliveries.is_empty());
    }

    #[test]
    fn unregister_stops_deliveries() {
        let mut registry = ListenerRegistry::default();
        let (tx, _rx) = mpsc::channel();
        let id = registry.register(path(&["cars"]), Arc::new(ChannelListener::new(tx)));
        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert!(registry
            .deliveries_for(&candidate_writing(&["cars"]))
            .is_empty());
    }
}
