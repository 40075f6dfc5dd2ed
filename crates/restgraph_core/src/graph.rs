//! Local object graph storage.
//!
//! The graph store is the opaque persistence layer underneath the sync
//! engine. It knows nothing about remote identifiers beyond what the nodes
//! themselves carry.

use crate::id::LocalId;
use crate::node::CachedNode;
use crate::query::{Predicate, QueryWindow};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Storage for cached nodes.
///
/// Implementations must be safe to share between the coordinators of one
/// context. No I/O semantics are implied.
pub trait GraphStore: Send + Sync {
    /// Gets a node by local identity.
    fn get(&self, id: LocalId) -> Option<CachedNode>;

    /// Inserts or replaces a node.
    fn put(&self, node: CachedNode);

    /// Removes a node, returning it if it existed.
    fn delete(&self, id: LocalId) -> Option<CachedNode>;

    /// Returns matching identities of one entity, in insertion order, windowed.
    fn query(&self, entity: &str, predicate: &Predicate, window: QueryWindow) -> Vec<LocalId>;

    /// Returns the number of nodes.
    fn len(&self) -> usize;

    /// Returns true if the store holds no nodes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Slot {
    sequence: u64,
    node: CachedNode,
}

#[derive(Default)]
struct Inner {
    slots: HashMap<LocalId, Slot>,
    next_sequence: u64,
}

/// An in-memory graph store.
///
/// Results are ordered by first insertion; replacing a node keeps its
/// position.
#[derive(Default)]
pub struct MemoryGraph {
    inner: RwLock<Inner>,
}

impl MemoryGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }
}

impl GraphStore for MemoryGraph {
    fn get(&self, id: LocalId) -> Option<CachedNode> {
        self.inner.read().slots.get(&id).map(|slot| slot.node.clone())
    }

    fn put(&self, node: CachedNode) {
        let mut inner = self.inner.write();
        if let Some(slot) = inner.slots.get_mut(&node.local_id) {
            slot.node = node;
            return;
        }
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.slots.insert(node.local_id, Slot { sequence, node });
    }

    fn delete(&self, id: LocalId) -> Option<CachedNode> {
        self.inner.write().slots.remove(&id).map(|slot| slot.node)
    }

    fn query(&self, entity: &str, predicate: &Predicate, window: QueryWindow) -> Vec<LocalId> {
        let inner = self.inner.read();
        let mut matches: Vec<&Slot> = inner
            .slots
            .values()
            .filter(|slot| slot.node.entity == entity && predicate.matches(&slot.node))
            .collect();
        matches.sort_by_key(|slot| slot.sequence);
        window.apply(matches.into_iter().map(|slot| slot.node.local_id))
    }

    fn len(&self) -> usize {
        self.inner.read().slots.len()
    }
}
