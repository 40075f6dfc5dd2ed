//! Write-back coordinator.
//!
//! Pushes a batch of local changes to the remote service, one request per
//! changed object, and reconciles each canonical response into the graph:
//!
//! - insert: `POST <collection>` with every attribute; the response binds
//!   the resource identifier
//! - update: `PUT <object>` with the changed attributes only; changes that
//!   touch only relationships send nothing
//! - delete: `DELETE <object>`; objects never synced are deleted locally
//!
//! Per-object operations run concurrently. A failure is recorded against its
//! object and never aborts the rest of the batch; the failed change stays
//! pending for the next save. An insert the server accepted but whose
//! identifier conflicts locally is reported and not queued again.

use crate::context::{InsertGate, SyncContext};
use crate::error::{SyncError, SyncResult};
use crate::merge::Merger;
use crate::notification::{Notification, NotificationCenter, OperationSet, RemoteOperation};
use crate::request::{RemoteRequest, RemoteResponse, RequestFactory};
use crate::transport::Transport;
use futures::future::join_all;
use restgraph_core::{
    CachedNode, CoreError, LocalId, Predicate, QueryWindow, RepresentationError, Translator,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// An unsaved local change to one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingChange {
    /// Created locally, not yet known remotely.
    Insert,
    /// Attributes or relationships changed locally.
    Update {
        /// Names of the changed attributes and relationships.
        changed: BTreeSet<String>,
    },
    /// Deleted locally.
    Delete,
}

impl PendingChange {
    /// An update of the named attributes or relationships.
    pub fn update<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Update {
            changed: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Combines this change with one recorded after it.
    pub fn merge(self, newer: PendingChange) -> PendingChange {
        match (self, newer) {
            (_, PendingChange::Delete) | (PendingChange::Delete, _) => PendingChange::Delete,
            (PendingChange::Insert, _) | (_, PendingChange::Insert) => PendingChange::Insert,
            (
                PendingChange::Update { mut changed },
                PendingChange::Update { changed: newer },
            ) => {
                changed.extend(newer);
                PendingChange::Update { changed }
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            PendingChange::Insert => "insert",
            PendingChange::Update { .. } => "update",
            PendingChange::Delete => "delete",
        }
    }
}

/// The changes of one save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    /// Batch number, unique per store.
    pub id: u64,
    /// One change per object.
    pub changes: Vec<(LocalId, PendingChange)>,
}

impl ChangeBatch {
    /// Creates a batch.
    pub fn new(id: u64, changes: Vec<(LocalId, PendingChange)>) -> Self {
        Self { id, changes }
    }

    fn matching(&self, f: impl Fn(&PendingChange) -> bool) -> Vec<LocalId> {
        self.changes
            .iter()
            .filter(|(_, change)| f(change))
            .map(|(local, _)| *local)
            .collect()
    }

    /// Inserted objects.
    pub fn inserted(&self) -> Vec<LocalId> {
        self.matching(|change| matches!(change, PendingChange::Insert))
    }

    /// Updated objects.
    pub fn updated(&self) -> Vec<LocalId> {
        self.matching(|change| matches!(change, PendingChange::Update { .. }))
    }

    /// Deleted objects.
    pub fn deleted(&self) -> Vec<LocalId> {
        self.matching(|change| matches!(change, PendingChange::Delete))
    }

    /// Number of changes.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns true if the batch has no changes.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Result of a save.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveReport {
    /// The saved batch.
    pub batch_id: u64,
    /// Objects whose change was committed, remotely or locally.
    pub committed: Vec<LocalId>,
    /// Objects whose remote request was suppressed by the request factory.
    pub suppressed: Vec<LocalId>,
    /// Objects whose change failed and remains pending.
    pub errors: BTreeMap<LocalId, SyncError>,
}

impl SaveReport {
    /// Returns true if no object failed.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// What a change turned into before anything was sent.
enum Prepared {
    Send(RemoteRequest),
    Suppressed,
    LocalOnly,
    /// Waits for an in-flight insert of the same object.
    Deferred,
    Failed(SyncError),
}

enum Outcome {
    Committed,
    Suppressed,
    Failed(SyncError),
    /// The remote write happened; retrying would repeat it.
    Abandoned(SyncError),
}

struct Settled {
    local: LocalId,
    change: PendingChange,
    operation: Option<RemoteOperation>,
    outcome: Outcome,
}

/// Pushes local changes to the remote service.
pub struct WriteBackCoordinator {
    context: Arc<SyncContext>,
    factory: Arc<dyn RequestFactory>,
    transport: Arc<dyn Transport>,
    notifications: Arc<NotificationCenter>,
}

impl WriteBackCoordinator {
    /// Creates a coordinator.
    pub fn new(
        context: Arc<SyncContext>,
        factory: Arc<dyn RequestFactory>,
        transport: Arc<dyn Transport>,
        notifications: Arc<NotificationCenter>,
    ) -> Self {
        Self {
            context,
            factory,
            transport,
            notifications,
        }
    }

    /// Saves a batch.
    ///
    /// The will-save notification carries the operations that could be
    /// built up front; operations waiting on an in-flight insert appear only
    /// in the did-save notification.
    pub async fn save(&self, batch: ChangeBatch) -> SyncResult<SaveReport> {
        self.context.ensure_live()?;

        let mut gates: HashMap<LocalId, InsertGate> = batch
            .inserted()
            .into_iter()
            .map(|local| (local, self.context.open_insert_gate(local)))
            .collect();

        let mut planned = Vec::with_capacity(batch.len());
        let mut upfront = OperationSet::new();
        for (local, change) in &batch.changes {
            let prepared = self.prepare(*local, change);
            let operation = match &prepared {
                Prepared::Send(request) => {
                    let operation = self.context.operation_for(request);
                    upfront.push(operation.clone());
                    Some(operation)
                }
                _ => None,
            };
            planned.push((*local, change.clone(), prepared, operation, gates.remove(local)));
        }

        debug!(batch = batch.id, changes = batch.len(), requests = upfront.len(), "saving");
        self.notifications.emit(Notification::WillSave {
            operations: upfront,
            batch: batch.clone(),
        });

        let settled = join_all(planned.into_iter().map(
            |(local, change, prepared, operation, gate)| {
                self.execute(local, change, prepared, operation, gate)
            },
        ))
        .await;

        let mut report = SaveReport {
            batch_id: batch.id,
            ..SaveReport::default()
        };
        let mut operations = OperationSet::new();
        for settled in settled {
            if let Some(operation) = settled.operation {
                operations.push(operation);
            }
            match settled.outcome {
                Outcome::Committed => report.committed.push(settled.local),
                Outcome::Suppressed => report.suppressed.push(settled.local),
                Outcome::Failed(error) => {
                    warn!(
                        object = %settled.local,
                        change = settled.change.kind(),
                        error = %error,
                        "change failed, keeping it pending"
                    );
                    self.context.restore_pending(settled.local, settled.change);
                    report.errors.insert(settled.local, error);
                }
                Outcome::Abandoned(error) => {
                    warn!(
                        object = %settled.local,
                        change = settled.change.kind(),
                        error = %error,
                        "remote write applied but not reconciled, dropping change"
                    );
                    report.errors.insert(settled.local, error);
                }
            }
        }

        self.notifications.emit(Notification::DidSave {
            operations,
            batch,
            errors: report.errors.clone(),
        });
        Ok(report)
    }

    fn prepare(&self, local: LocalId, change: &PendingChange) -> Prepared {
        let node = match self.context.node(local) {
            Ok(node) => node,
            Err(error) => return Prepared::Failed(error),
        };

        match change {
            PendingChange::Insert => match self.factory.request_for_insert(&node) {
                Ok(Some(request)) => Prepared::Send(request),
                Ok(None) => Prepared::Suppressed,
                Err(error) => Prepared::Failed(error.into()),
            },
            PendingChange::Update { changed } => {
                let subset = match self.attribute_subset(&node, changed) {
                    Ok(subset) => subset,
                    Err(error) => return Prepared::Failed(error),
                };
                if subset.is_empty() {
                    return Prepared::LocalOnly;
                }
                match node.resource_id() {
                    Some(resource_id) => {
                        match self.factory.request_for_update(&node, resource_id, &subset) {
                            Ok(Some(request)) => Prepared::Send(request),
                            Ok(None) => Prepared::Suppressed,
                            Err(error) => Prepared::Failed(error.into()),
                        }
                    }
                    None if self.context.has_insert_in_flight(local) => Prepared::Deferred,
                    None => Prepared::Failed(SyncError::precision(local, "update")),
                }
            }
            PendingChange::Delete => match node.resource_id() {
                Some(resource_id) => match self.factory.request_for_delete(&node, resource_id) {
                    Some(request) => Prepared::Send(request),
                    None => Prepared::Suppressed,
                },
                None if self.context.has_insert_in_flight(local) => Prepared::Deferred,
                None => Prepared::LocalOnly,
            },
        }
    }

    /// Changed names that are attributes of the node's entity.
    fn attribute_subset(
        &self,
        node: &CachedNode,
        changed: &BTreeSet<String>,
    ) -> SyncResult<BTreeSet<String>> {
        let entity = self.context.catalog().require_entity(&node.entity)?;
        Ok(changed
            .iter()
            .filter(|name| entity.has_attribute(name))
            .cloned()
            .collect())
    }

    async fn execute(
        &self,
        local: LocalId,
        change: PendingChange,
        prepared: Prepared,
        mut operation: Option<RemoteOperation>,
        gate: Option<InsertGate>,
    ) -> Settled {
        let prepared = match prepared {
            Prepared::Deferred => {
                self.context.wait_for_insert(local).await;
                match self.prepare(local, &change) {
                    Prepared::Deferred => {
                        Prepared::Failed(SyncError::precision(local, change.kind()))
                    }
                    Prepared::Send(request) => {
                        operation = Some(self.context.operation_for(&request));
                        Prepared::Send(request)
                    }
                    other => other,
                }
            }
            other => other,
        };

        let outcome = match prepared {
            Prepared::Send(request) => {
                debug!(object = %local, method = %request.method, path = %request.path, "writing");
                match self.transport.send(request).await {
                    Err(cause) => Outcome::Failed(SyncError::Transport(cause)),
                    Ok(_) if self.context.is_torn_down() => {
                        warn!(object = %local, "context torn down, discarding write result");
                        Outcome::Failed(SyncError::ContextTornDown)
                    }
                    Ok(response) => match self.reconcile(local, &change, response) {
                        Ok(()) => Outcome::Committed,
                        Err(error @ SyncError::Core(CoreError::IdentityConflict { .. })) => {
                            Outcome::Abandoned(error)
                        }
                        Err(error) => Outcome::Failed(error),
                    },
                }
            }
            Prepared::Suppressed => {
                debug!(object = %local, change = change.kind(), "remote request suppressed");
                self.commit_locally(local, &change);
                Outcome::Suppressed
            }
            Prepared::LocalOnly => {
                self.commit_locally(local, &change);
                Outcome::Committed
            }
            Prepared::Failed(error) => Outcome::Failed(error),
            Prepared::Deferred => Outcome::Failed(SyncError::precision(local, change.kind())),
        };

        // The insert's identifier is bound by now; let waiters through.
        if let Some(gate) = gate {
            drop(gate);
            self.context.release_insert_gate(local);
        }

        Settled {
            local,
            change,
            operation,
            outcome,
        }
    }

    fn commit_locally(&self, local: LocalId, change: &PendingChange) {
        if matches!(change, PendingChange::Delete) {
            self.remove(local);
        }
    }

    /// Removes an object and every reference other nodes hold to it.
    fn remove(&self, local: LocalId) {
        let graph = self.context.graph();
        let Some(node) = graph.get(local) else {
            self.context.registry().unbind(local);
            return;
        };
        graph.delete(local);
        self.context.registry().unbind(local);

        let catalog = self.context.catalog();
        for entity in catalog.entities() {
            let pointing: Vec<&str> = entity
                .relationships
                .iter()
                .filter(|relationship| relationship.destination == node.entity)
                .map(|relationship| relationship.name.as_str())
                .collect();
            if pointing.is_empty() {
                continue;
            }
            for holder in graph.query(&entity.name, &Predicate::All, QueryWindow::default()) {
                let Some(mut holder) = graph.get(holder) else {
                    continue;
                };
                let mut touched = false;
                for name in &pointing {
                    if let Some(mut value) = holder.relationship(name).cloned() {
                        if value.remove(local) {
                            holder.set_relationship(*name, value);
                            touched = true;
                        }
                    }
                }
                if touched {
                    debug!(
                        object = %holder.local_id,
                        removed = %local,
                        "dropped reference to deleted object"
                    );
                    graph.put(holder);
                }
            }
        }
    }

    fn reconcile(
        &self,
        local: LocalId,
        change: &PendingChange,
        response: RemoteResponse,
    ) -> SyncResult<()> {
        match change {
            PendingChange::Delete => {
                self.remove(local);
                Ok(())
            }
            PendingChange::Insert => self.reconcile_record(local, response, true),
            PendingChange::Update { .. } => self.reconcile_record(local, response, false),
        }
    }

    /// Applies the canonical representation returned by a write.
    fn reconcile_record(
        &self,
        local: LocalId,
        response: RemoteResponse,
        require_identifier: bool,
    ) -> SyncResult<()> {
        let node = self.context.node(local)?;
        let last_modified = response.last_modified().map(str::to_string);
        let body = self
            .context
            .translator()
            .unwrap_collection(&node.entity, response.body);
        let (records, element_errors) = Translator::representations_of(&node.entity, body);
        let mut merger = Merger::new(&self.context);
        for error in element_errors {
            merger.record_error(error);
        }

        let missing_identifier = || {
            SyncError::Core(
                RepresentationError::element(&node.entity, "response has no resource identifier")
                    .into(),
            )
        };

        let Some(record) = records.into_iter().next() else {
            return if require_identifier {
                Err(missing_identifier())
            } else {
                Ok(())
            };
        };

        match Translator::resource_identifier_of(&record) {
            Some(resource_id) => self
                .context
                .registry()
                .bind(local, &resource_id, &node.entity)?,
            None if require_identifier => return Err(missing_identifier()),
            None => {}
        }

        merger.apply_record(local, &node.entity, &record, last_modified.as_deref())?;
        Ok(())
    }
}
