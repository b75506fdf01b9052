//! Path-to-shard routing.

use std::collections::HashMap;
use std::sync::Arc;
use trellis_shard::{ShardDataTree, ShardId};
use trellis_tree::TreePath;

/// Maps tree paths to the shards that own them.
///
/// Every path resolves to exactly one shard; the mapping must stay stable for
/// the lifetime of a history, since gap tracking is kept per shard.
pub trait ShardResolver: Send + Sync {
    /// Returns the shard owning `path`.
    fn resolve(&self, path: &TreePath) -> ShardId;

    /// Returns the shard's pipeline, if this instance hosts it.
    fn shard(&self, id: ShardId) -> Option<Arc<ShardDataTree>>;

    /// Returns every shard this resolver routes to.
    fn shard_ids(&self) -> Vec<ShardId>;
}

/// Routes by a path's first segment, with a default shard for everything
/// unrouted. The root path resolves to the default shard.
pub struct PrefixResolver {
    routes: HashMap<String, ShardId>,
    default_shard: ShardId,
    shards: HashMap<ShardId, Arc<ShardDataTree>>,
}

impl PrefixResolver {
    /// Creates a resolver sending everything to `default_shard`.
    #[must_use]
    pub fn new(default_shard: ShardId) -> Self {
        Self {
            routes: HashMap::new(),
            default_shard,
            shards: HashMap::new(),
        }
    }

    /// Registers a shard's pipeline.
    #[must_use]
    pub fn with_shard(mut self, id: ShardId, tree: Arc<ShardDataTree>) -> Self {
        self.shards.insert(id, tree);
        self
    }

    /// Routes paths whose first segment is `prefix` to `shard`.
    #[must_use]
    pub fn with_route(mut self, prefix: impl Into<String>, shard: ShardId) -> Self {
        self.routes.insert(prefix.into(), shard);
        self
    }
}

impl ShardResolver for PrefixResolver {
    fn resolve(&self, path: &TreePath) -> ShardId {
        path.segments()
            .first()
            .and_then(|segment| self.routes.get(segment).copied())
            .unwrap_or(self.default_shard)
    }

    fn shard(&self, id: ShardId) -> Option<Arc<ShardDataTree>> {
        self.shards.get(&id).cloned()
    }

    fn shard_ids(&self) -> Vec<ShardId> {
        let mut ids: Vec<ShardId> = self.shards.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
