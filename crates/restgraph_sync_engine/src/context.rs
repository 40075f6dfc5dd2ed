//! The sync context: one local graph with its registry and bookkeeping.
//!
//! A context owns everything the coordinators share: the graph store, the
//! identity registry, the translator, the pending local changes, and the
//! insert gates that order dependent operations behind an in-flight insert.
//! Registries are never shared between contexts.

use crate::error::{SyncError, SyncResult};
use crate::notification::RemoteOperation;
use crate::request::RemoteRequest;
use crate::write_back::PendingChange;
use parking_lot::Mutex;
use restgraph_core::{
    CachedNode, Catalog, CoreError, EnglishInflector, GraphStore, IdentityRegistry, Inflector,
    LocalId, MemoryGraph, Translator,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Held by an insert while its request is in flight.
///
/// Dropping the gate opens it, whether or not the insert succeeded; waiters
/// then re-check the object's resource identifier.
#[derive(Debug)]
pub struct InsertGate {
    local: LocalId,
    sender: watch::Sender<bool>,
}

impl Drop for InsertGate {
    fn drop(&mut self) {
        self.sender.send_replace(true);
        debug!(object = %self.local, "insert gate opened");
    }
}

/// Shared state of one local graph.
pub struct SyncContext {
    graph: Arc<dyn GraphStore>,
    registry: IdentityRegistry,
    translator: Translator,
    pending: Mutex<BTreeMap<LocalId, PendingChange>>,
    gates: Mutex<HashMap<LocalId, watch::Receiver<bool>>>,
    torn_down: AtomicBool,
    next_operation: AtomicU64,
}

impl SyncContext {
    /// Creates a context over a graph store.
    pub fn new(catalog: Catalog, graph: Arc<dyn GraphStore>, inflector: Arc<dyn Inflector>) -> Self {
        Self {
            graph,
            registry: IdentityRegistry::new(),
            translator: Translator::new(Arc::new(catalog), inflector),
            pending: Mutex::new(BTreeMap::new()),
            gates: Mutex::new(HashMap::new()),
            torn_down: AtomicBool::new(false),
            next_operation: AtomicU64::new(1),
        }
    }

    /// Creates a context over an empty in-memory graph with English
    /// inflection.
    pub fn in_memory(catalog: Catalog) -> Self {
        Self::new(
            catalog,
            Arc::new(MemoryGraph::new()),
            Arc::new(EnglishInflector),
        )
    }

    /// The graph store.
    pub fn graph(&self) -> &dyn GraphStore {
        self.graph.as_ref()
    }

    /// The identity registry.
    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    /// The translator.
    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    /// The catalog.
    pub fn catalog(&self) -> &Catalog {
        self.translator.catalog()
    }

    /// Reads a node, failing with `NodeNotFound`.
    pub fn node(&self, local: LocalId) -> SyncResult<CachedNode> {
        self.graph
            .get(local)
            .ok_or(SyncError::Core(CoreError::NodeNotFound(local)))
    }

    /// Marks the context torn down. In-flight results are discarded.
    pub fn tear_down(&self) {
        self.torn_down.store(true, Ordering::SeqCst);
    }

    /// Returns true after `tear_down`.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Fails with `ContextTornDown` after `tear_down`.
    pub fn ensure_live(&self) -> SyncResult<()> {
        if self.is_torn_down() {
            Err(SyncError::ContextTornDown)
        } else {
            Ok(())
        }
    }

    /// Allocates an operation record for a request.
    pub fn operation_for(&self, request: &RemoteRequest) -> RemoteOperation {
        RemoteOperation {
            id: self.next_operation.fetch_add(1, Ordering::SeqCst),
            method: request.method,
            path: request.path.clone(),
        }
    }

    /// Registers an insert gate for an object.
    pub fn open_insert_gate(&self, local: LocalId) -> InsertGate {
        let (sender, receiver) = watch::channel(false);
        self.gates.lock().insert(local, receiver);
        InsertGate { local, sender }
    }

    /// Returns true if an insert of this object is in flight.
    pub fn has_insert_in_flight(&self, local: LocalId) -> bool {
        self.gates
            .lock()
            .get(&local)
            .is_some_and(|receiver| !*receiver.borrow())
    }

    /// Waits until any in-flight insert of this object has settled.
    pub async fn wait_for_insert(&self, local: LocalId) {
        let receiver = self.gates.lock().get(&local).cloned();
        let Some(mut receiver) = receiver else {
            return;
        };
        debug!(object = %local, "waiting for in-flight insert");
        // A closed channel means the gate was dropped, which also opens it.
        let _ = receiver.wait_for(|open| *open).await;
        self.release_insert_gate(local);
    }

    /// Forgets a settled insert gate. Receivers already handed to waiters
    /// still observe it as open.
    pub fn release_insert_gate(&self, local: LocalId) {
        let mut gates = self.gates.lock();
        if gates.get(&local).is_some_and(|receiver| *receiver.borrow()) {
            gates.remove(&local);
        }
    }

    /// Number of registered insert gates.
    pub fn insert_gate_count(&self) -> usize {
        self.gates.lock().len()
    }

    /// Records a local insert.
    pub fn record_insert(&self, local: LocalId) {
        self.pending.lock().insert(local, PendingChange::Insert);
    }

    /// Records a local change to an attribute or relationship.
    pub fn record_update(&self, local: LocalId, name: &str) {
        let mut pending = self.pending.lock();
        match pending.get_mut(&local) {
            // Inserts send the full attribute set; deletes win.
            Some(PendingChange::Insert) | Some(PendingChange::Delete) => {}
            Some(PendingChange::Update { changed }) => {
                changed.insert(name.to_string());
            }
            None => {
                pending.insert(local, PendingChange::update([name]));
            }
        }
    }

    /// Records a local delete.
    pub fn record_delete(&self, local: LocalId) {
        self.pending.lock().insert(local, PendingChange::Delete);
    }

    /// Returns the pending change of an object.
    pub fn pending_change(&self, local: LocalId) -> Option<PendingChange> {
        self.pending.lock().get(&local).cloned()
    }

    /// Returns true if the object has unsaved local changes.
    pub fn has_pending(&self, local: LocalId) -> bool {
        self.pending.lock().contains_key(&local)
    }

    /// Number of objects with unsaved changes.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Removes and returns all pending changes.
    pub fn take_pending(&self) -> Vec<(LocalId, PendingChange)> {
        std::mem::take(&mut *self.pending.lock())
            .into_iter()
            .collect()
    }

    /// Puts a change back after its remote operation failed, merging it with
    /// anything recorded since.
    pub fn restore_pending(&self, local: LocalId, change: PendingChange) {
        let mut pending = self.pending.lock();
        let merged = match pending.remove(&local) {
            None => change,
            Some(newer) => change.merge(newer),
        };
        pending.insert(local, merged);
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("nodes", &self.graph.len())
            .field("registry", &self.registry.len())
            .field("pending", &self.pending_count())
            .field("insert_gates", &self.insert_gate_count())
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}
