//! The incremental store: a locally queryable, locally mutable view of a
//! remote REST collection.

use crate::config::SyncConfig;
use crate::context::SyncContext;
use crate::error::{SyncError, SyncResult};
use crate::fetch::{FetchCoordinator, FetchOutcome, FetchStats};
use crate::notification::{Notification, NotificationCenter};
use crate::request::{RequestFactory, RestRequestFactory};
use crate::transport::Transport;
use crate::write_back::{ChangeBatch, PendingChange, SaveReport, WriteBackCoordinator};
use restgraph_core::{
    AttributeValue, CachedNode, Cardinality, Catalog, CoreError, LocalId, Query, QueryWindow,
    RelationshipDescription, RelationshipValue, RepresentationError,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::debug;

/// Local object graph backed by a remote REST service.
///
/// Reads go to the local graph; `execute_query` and the fault methods pull
/// from the remote service first. Local mutations are recorded as pending
/// changes and pushed by `save`.
pub struct IncrementalStore {
    context: Arc<SyncContext>,
    fetcher: FetchCoordinator,
    writer: WriteBackCoordinator,
    notifications: Arc<NotificationCenter>,
    next_batch: AtomicU64,
}

impl IncrementalStore {
    /// Creates a store over an in-memory graph using the REST convention
    /// request factory.
    pub fn new(catalog: Catalog, config: &SyncConfig, transport: Arc<dyn Transport>) -> Self {
        let context = Arc::new(SyncContext::in_memory(catalog));
        let factory = RestRequestFactory::new(context.translator().clone(), config);
        Self::from_parts(context, Arc::new(factory), transport)
    }

    /// Creates a store from explicit parts.
    pub fn from_parts(
        context: Arc<SyncContext>,
        factory: Arc<dyn RequestFactory>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let notifications = Arc::new(NotificationCenter::new());
        Self {
            fetcher: FetchCoordinator::new(
                Arc::clone(&context),
                Arc::clone(&factory),
                Arc::clone(&transport),
                Arc::clone(&notifications),
            ),
            writer: WriteBackCoordinator::new(
                Arc::clone(&context),
                factory,
                transport,
                Arc::clone(&notifications),
            ),
            context,
            notifications,
            next_batch: AtomicU64::new(1),
        }
    }

    /// The shared context.
    pub fn context(&self) -> &SyncContext {
        &self.context
    }

    /// The catalog.
    pub fn catalog(&self) -> &Catalog {
        self.context.catalog()
    }

    /// Reads a node from the local graph.
    pub fn node(&self, local: LocalId) -> Option<CachedNode> {
        self.context.graph().get(local)
    }

    /// Answers a query from the local graph only. Objects deleted locally
    /// but not yet saved are excluded.
    pub fn query(&self, query: &Query) -> Vec<LocalId> {
        let graph = self.context.graph();
        let matches = graph.query(&query.entity, &query.predicate, QueryWindow::default());
        query.window.apply(
            matches
                .into_iter()
                .filter(|local| !self.is_deleted_locally(*local)),
        )
    }

    fn is_deleted_locally(&self, local: LocalId) -> bool {
        matches!(
            self.context.pending_change(local),
            Some(PendingChange::Delete)
        )
    }

    /// Fetches the query's window from the remote service, then answers the
    /// query from the merged records.
    pub async fn execute_query(&self, query: &Query) -> SyncResult<Vec<LocalId>> {
        let FetchOutcome { fetched, .. } = self.fetcher.fetch_collection(query).await?;
        let graph = self.context.graph();
        Ok(fetched
            .into_iter()
            .filter(|local| {
                graph
                    .get(*local)
                    .is_some_and(|node| query.predicate.matches(&node))
            })
            .collect())
    }

    /// Fetches a collection, returning the full outcome.
    pub async fn fetch_collection(&self, query: &Query) -> SyncResult<FetchOutcome> {
        self.fetcher.fetch_collection(query).await
    }

    /// Returns an object, fetching its attributes when needed.
    pub async fn fault_object(&self, local: LocalId) -> SyncResult<CachedNode> {
        self.fetcher.fault_object(local).await
    }

    /// Returns a relationship of an object, fetching it when needed.
    pub async fn fault_relationship(
        &self,
        local: LocalId,
        relationship: &str,
    ) -> SyncResult<RelationshipValue> {
        self.fetcher.fault_relationship(local, relationship).await
    }

    /// Creates an object locally.
    pub fn insert(
        &self,
        entity: &str,
        attributes: BTreeMap<String, AttributeValue>,
    ) -> SyncResult<LocalId> {
        self.context.ensure_live()?;
        let description = self.context.catalog().require_entity(entity)?;
        let mut node = CachedNode::new(LocalId::new(), entity);
        for (name, value) in attributes {
            if !description.has_attribute(&name) {
                return Err(not_an_attribute(entity, &name));
            }
            node.set_attribute(name, value);
        }

        let local = node.local_id;
        self.context.graph().put(node);
        self.context.record_insert(local);
        debug!(object = %local, entity, "inserted locally");
        Ok(local)
    }

    /// Sets an attribute locally.
    pub fn set_attribute(
        &self,
        local: LocalId,
        name: &str,
        value: impl Into<AttributeValue>,
    ) -> SyncResult<()> {
        self.context.ensure_live()?;
        let mut node = self.context.node(local)?;
        if !self.context.catalog().require_entity(&node.entity)?.has_attribute(name) {
            return Err(not_an_attribute(&node.entity, name));
        }
        node.set_attribute(name, value.into());
        self.context.graph().put(node);
        self.context.record_update(local, name);
        Ok(())
    }

    /// Sets a to-one relationship locally.
    pub fn set_to_one(&self, local: LocalId, name: &str, target: Option<LocalId>) -> SyncResult<()> {
        self.set_relationship(local, name, Cardinality::ToOne, RelationshipValue::ToOne(target))
    }

    /// Sets a to-many relationship locally.
    pub fn set_to_many(&self, local: LocalId, name: &str, members: Vec<LocalId>) -> SyncResult<()> {
        self.set_relationship(
            local,
            name,
            Cardinality::ToMany,
            RelationshipValue::to_many(members),
        )
    }

    fn set_relationship(
        &self,
        local: LocalId,
        name: &str,
        cardinality: Cardinality,
        value: RelationshipValue,
    ) -> SyncResult<()> {
        self.context.ensure_live()?;
        let mut node = self.context.node(local)?;
        let relationship = self
            .context
            .catalog()
            .require_relationship(&node.entity, name)?;
        check_cardinality(&node.entity, relationship, cardinality)?;
        for target in value.ids() {
            let target = self.context.node(target)?;
            if target.entity != relationship.destination {
                return Err(SyncError::Core(
                    RepresentationError::field(
                        &node.entity,
                        name,
                        format!(
                            "expected {} objects, got {}",
                            relationship.destination, target.entity
                        ),
                    )
                    .into(),
                ));
            }
        }

        node.set_relationship(name, value);
        self.context.graph().put(node);
        self.context.record_update(local, name);
        Ok(())
    }

    /// Deletes an object locally. The remote delete happens on save.
    pub fn delete(&self, local: LocalId) -> SyncResult<()> {
        self.context.ensure_live()?;
        self.context.node(local)?;
        self.context.record_delete(local);
        Ok(())
    }

    /// Returns true if there are unsaved local changes.
    pub fn has_changes(&self) -> bool {
        self.context.pending_count() > 0
    }

    /// Pushes all pending changes.
    ///
    /// With nothing pending, returns an empty report without notifications.
    pub async fn save(&self) -> SyncResult<SaveReport> {
        self.context.ensure_live()?;
        let id = self.next_batch.fetch_add(1, Ordering::SeqCst);
        let changes = self.context.take_pending();
        if changes.is_empty() {
            return Ok(SaveReport {
                batch_id: id,
                ..SaveReport::default()
            });
        }
        self.writer.save(ChangeBatch::new(id, changes)).await
    }

    /// Subscribes to lifecycle notifications.
    pub fn subscribe(&self) -> Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// Recent notifications, oldest first.
    pub fn notification_history(&self) -> Vec<Notification> {
        self.notifications.history()
    }

    /// Fetch statistics.
    pub fn stats(&self) -> FetchStats {
        self.fetcher.stats()
    }

    /// Tears the context down. Results of requests still in flight are
    /// discarded, and every later operation fails with `ContextTornDown`.
    pub fn tear_down(&self) {
        debug!("tearing down sync context");
        self.context.tear_down();
    }
}

fn not_an_attribute(entity: &str, name: &str) -> SyncError {
    SyncError::Core(CoreError::Representation(RepresentationError::field(
        entity,
        name,
        "not an attribute of the entity",
    )))
}

fn check_cardinality(
    entity: &str,
    relationship: &RelationshipDescription,
    expected: Cardinality,
) -> SyncResult<()> {
    if relationship.cardinality == expected {
        return Ok(());
    }
    Err(SyncError::Core(
        RepresentationError::field(
            entity,
            relationship.name.clone(),
            format!("relationship is {:?}", relationship.cardinality),
        )
        .into(),
    ))
}
