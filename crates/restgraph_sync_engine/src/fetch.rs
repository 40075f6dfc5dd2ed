//! Fetch coordinator.
//!
//! Pulls remote data into the local graph: whole collections, single
//! objects ("object faults") and single relationships ("relationship
//! faults"). Every fetch walks the same state machine:
//!
//! ```text
//! NotStarted -> RequestBuilt -> InFlight -> Decoded -> Merged
//!      \______________\______________\__________\-----> Failed
//! ```
//!
//! A failed fetch never touches previously merged state, and is never
//! retried.

use crate::context::SyncContext;
use crate::error::{SyncError, SyncResult, TransportError};
use crate::merge::Merger;
use crate::notification::{Notification, NotificationCenter, OperationSet};
use crate::request::{RemoteRequest, RemoteResponse, RequestFactory};
use crate::transport::Transport;
use parking_lot::RwLock;
use restgraph_core::{
    CachedNode, CoreError, LocalId, Predicate, Query, QueryWindow, RelationshipDescription,
    RelationshipValue, RepresentationError, Translator,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// The state of one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    /// Nothing has happened yet.
    NotStarted,
    /// The request exists but has not been sent.
    RequestBuilt,
    /// The request has been sent.
    InFlight,
    /// The response has been decoded into records.
    Decoded,
    /// The records are in the graph.
    Merged,
    /// The fetch failed.
    Failed,
}

impl FetchState {
    /// Returns true for `Merged` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FetchState::Merged | FetchState::Failed)
    }

    /// Returns true if the state machine allows `self -> next`.
    pub fn can_transition_to(&self, next: FetchState) -> bool {
        use FetchState::*;
        match (self, next) {
            (NotStarted, RequestBuilt)
            | (RequestBuilt, InFlight)
            | (InFlight, Decoded)
            | (Decoded, Merged) => true,
            (current, Failed) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for FetchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Statistics about fetches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchStats {
    /// Requests sent.
    pub fetches_started: u64,
    /// Fetches that reached `Merged`.
    pub fetches_merged: u64,
    /// Fetches that reached `Failed`.
    pub fetches_failed: u64,
    /// Records merged into the graph.
    pub records_merged: u64,
    /// Records skipped for lack of an identifier or a decode error.
    pub records_skipped: u64,
}

/// Result of a collection fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOutcome {
    /// Merged local identities, in response order.
    pub fetched: Vec<LocalId>,
    /// Elements and fields that could not be decoded.
    pub errors: Vec<CoreError>,
}

/// Tracks one fetch through its states.
struct FetchTracker {
    kind: &'static str,
    state: FetchState,
}

impl FetchTracker {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            state: FetchState::NotStarted,
        }
    }

    fn advance(&mut self, next: FetchState) -> SyncResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(SyncError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        debug!(kind = self.kind, from = %self.state, to = %next, "fetch state");
        self.state = next;
        Ok(())
    }
}

/// Issues remote reads and merges the results.
pub struct FetchCoordinator {
    context: Arc<SyncContext>,
    factory: Arc<dyn RequestFactory>,
    transport: Arc<dyn Transport>,
    notifications: Arc<NotificationCenter>,
    stats: RwLock<FetchStats>,
}

impl FetchCoordinator {
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
            stats: RwLock::new(FetchStats::default()),
        }
    }

    /// Gets the current stats.
    pub fn stats(&self) -> FetchStats {
        self.stats.read().clone()
    }

    /// Sends a request, recording stats and moving the tracker to
    /// `Decoded` or `Failed`.
    async fn send(
        &self,
        tracker: &mut FetchTracker,
        request: RemoteRequest,
    ) -> SyncResult<RemoteResponse> {
        tracker.advance(FetchState::InFlight)?;
        self.stats.write().fetches_started += 1;
        debug!(method = %request.method, path = %request.path, "fetching");

        let result = self.transport.send(request).await;

        if self.context.is_torn_down() {
            warn!(kind = tracker.kind, "context torn down, discarding fetch result");
            return Err(self.fail(tracker, SyncError::ContextTornDown));
        }
        match result {
            Ok(response) => {
                tracker.advance(FetchState::Decoded)?;
                Ok(response)
            }
            Err(cause) => Err(self.fail(tracker, remote_failure(cause))),
        }
    }

    fn fail(&self, tracker: &mut FetchTracker, error: SyncError) -> SyncError {
        // Failed is reachable from every non-terminal state.
        let _ = tracker.advance(FetchState::Failed);
        self.stats.write().fetches_failed += 1;
        warn!(kind = tracker.kind, error = %error, "fetch failed");
        error
    }

    fn finish(&self, tracker: &mut FetchTracker, merged: usize, skipped: usize) -> SyncResult<()> {
        tracker.advance(FetchState::Merged)?;
        let mut stats = self.stats.write();
        stats.fetches_merged += 1;
        stats.records_merged += merged as u64;
        stats.records_skipped += skipped as u64;
        Ok(())
    }

    /// Fetches a collection and merges every record into the graph.
    ///
    /// An empty response is a valid, empty result.
    pub async fn fetch_collection(&self, query: &Query) -> SyncResult<FetchOutcome> {
        self.context.ensure_live()?;
        let mut tracker = FetchTracker::new("collection");
        let request = self.factory.request_for_collection(query)?;
        tracker.advance(FetchState::RequestBuilt)?;

        let operations = OperationSet::single(self.context.operation_for(&request));
        self.notifications.emit(Notification::WillFetchCollection {
            operations: operations.clone(),
            query: query.clone(),
        });

        let response = match self.send(&mut tracker, request).await {
            Ok(response) => response,
            Err(error) => {
                self.notifications.emit(Notification::DidFetchCollection {
                    operations,
                    query: query.clone(),
                    fetched: Vec::new(),
                    error: Some(error.clone()),
                });
                return Err(error);
            }
        };

        let outcome = self.merge_collection(&query.entity, response);
        self.finish(&mut tracker, outcome.fetched.len(), outcome.errors.len())?;
        debug!(entity = %query.entity, fetched = outcome.fetched.len(), "collection merged");

        self.notifications.emit(Notification::DidFetchCollection {
            operations,
            query: query.clone(),
            fetched: outcome.fetched.clone(),
            error: None,
        });
        Ok(outcome)
    }

    fn merge_collection(&self, entity: &str, response: RemoteResponse) -> FetchOutcome {
        let translator = self.context.translator();
        let last_modified = response.last_modified().map(str::to_string);
        let body = translator.unwrap_collection(entity, response.body);
        let (records, element_errors) = Translator::representations_of(entity, body);

        let mut merger = Merger::new(&self.context);
        for error in element_errors {
            merger.record_error(error);
        }

        let mut fetched = Vec::with_capacity(records.len());
        for record in &records {
            match merger.merge_record(entity, record, last_modified.as_deref()) {
                Ok(Some(local)) => fetched.push(local),
                Ok(None) => {}
                Err(error) => merger.record_error(error),
            }
        }

        FetchOutcome {
            fetched,
            errors: merger.into_errors(),
        }
    }

    /// Returns an object, fetching its attributes if they were never loaded
    /// or the request factory asks for a refresh.
    pub async fn fault_object(&self, local: LocalId) -> SyncResult<CachedNode> {
        self.context.ensure_live()?;
        let node = self.identified_node(local, "fault object").await?;
        let Some(resource_id) = node.resource_id().map(str::to_string) else {
            return Err(SyncError::precision(local, "fault object"));
        };
        if node.version() > 0 && !self.factory.should_refresh_object(&node) {
            return Ok(node);
        }

        let mut tracker = FetchTracker::new("object");
        let request = self.factory.request_for_object(&node, &resource_id);
        tracker.advance(FetchState::RequestBuilt)?;

        let operations = OperationSet::single(self.context.operation_for(&request));
        self.notifications.emit(Notification::WillFetchObject {
            operations: operations.clone(),
            object: local,
        });

        let result = match self.send(&mut tracker, request).await {
            Ok(response) => self.merge_object(&mut tracker, &node, response),
            Err(error) => Err(error),
        };

        self.notifications.emit(Notification::DidFetchObject {
            operations,
            object: local,
            error: result.as_ref().err().cloned(),
        });
        result
    }

    fn merge_object(
        &self,
        tracker: &mut FetchTracker,
        node: &CachedNode,
        response: RemoteResponse,
    ) -> SyncResult<CachedNode> {
        if response.is_not_modified() {
            debug!(object = %node.local_id, "not modified");
            self.finish(tracker, 0, 0)?;
            return self.context.node(node.local_id);
        }

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
        let Some(record) = records.into_iter().next() else {
            let error = SyncError::Core(
                RepresentationError::element(&node.entity, "object response has no record")
                    .into(),
            );
            return Err(self.fail(tracker, error));
        };

        if let Err(error) =
            merger.apply_record(node.local_id, &node.entity, &record, last_modified.as_deref())
        {
            return Err(self.fail(tracker, error.into()));
        }
        let skipped = merger.into_errors().len();
        self.finish(tracker, 1, skipped)?;
        self.context.node(node.local_id)
    }

    /// Returns a relationship of an object, fetching it when needed.
    ///
    /// To-many relationships are always fetched. To-one relationships are
    /// answered locally when a node of the destination entity already points
    /// back through the inverse. Objects with unsaved local changes are
    /// never fetched.
    pub async fn fault_relationship(
        &self,
        local: LocalId,
        name: &str,
    ) -> SyncResult<RelationshipValue> {
        self.context.ensure_live()?;
        let node = self.context.node(local)?;
        let relationship = self
            .context
            .catalog()
            .require_relationship(&node.entity, name)?
            .clone();

        if self.context.has_pending(local) {
            debug!(object = %local, relationship = name, "pending changes, answering locally");
            return Ok(local_value(&node, &relationship));
        }
        if !relationship.is_to_many() {
            if let Some(owner) = self.resolve_inverse_locally(local, &relationship) {
                debug!(object = %local, relationship = name, "inverse resolvable locally");
                let value = RelationshipValue::ToOne(Some(owner));
                let mut node = node;
                node.set_relationship(name, value.clone());
                self.context.graph().put(node);
                return Ok(value);
            }
        }

        let node = self.identified_node(local, "fault relationship").await?;
        let Some(resource_id) = node.resource_id().map(str::to_string) else {
            return Err(SyncError::precision(local, "fault relationship"));
        };

        let mut tracker = FetchTracker::new("relationship");
        let request = self
            .factory
            .request_for_relationship(&node, &resource_id, &relationship);
        tracker.advance(FetchState::RequestBuilt)?;

        let operations = OperationSet::single(self.context.operation_for(&request));
        self.notifications.emit(Notification::WillFetchRelationship {
            operations: operations.clone(),
            object: local,
            relationship: name.to_string(),
        });

        let result = match self.send(&mut tracker, request).await {
            Ok(response) => self.merge_relationship(&mut tracker, local, &relationship, response),
            Err(error) => Err(error),
        };

        self.notifications.emit(Notification::DidFetchRelationship {
            operations,
            object: local,
            relationship: name.to_string(),
            fetched: result
                .as_ref()
                .map(RelationshipValue::ids)
                .unwrap_or_default(),
            error: result.as_ref().err().cloned(),
        });
        result
    }

    fn merge_relationship(
        &self,
        tracker: &mut FetchTracker,
        local: LocalId,
        relationship: &RelationshipDescription,
        response: RemoteResponse,
    ) -> SyncResult<RelationshipValue> {
        let outcome = self.merge_collection(&relationship.destination, response);
        let value = if relationship.is_to_many() {
            RelationshipValue::to_many(outcome.fetched.iter().copied())
        } else {
            RelationshipValue::ToOne(outcome.fetched.last().copied())
        };

        // Re-read: the merge may have touched this node through an inverse.
        let mut node = match self.context.node(local) {
            Ok(node) => node,
            Err(error) => return Err(self.fail(tracker, error)),
        };
        node.set_relationship(relationship.name.clone(), value.clone());
        self.context.graph().put(node);

        self.finish(tracker, outcome.fetched.len(), outcome.errors.len())?;
        Ok(value)
    }

    /// Reads a node, first waiting for an in-flight insert if it has no
    /// resource identifier yet.
    async fn identified_node(&self, local: LocalId, operation: &str) -> SyncResult<CachedNode> {
        let node = self.context.node(local)?;
        if node.resource_id().is_some() || !self.context.has_insert_in_flight(local) {
            return Ok(node);
        }
        debug!(object = %local, operation, "waiting for insert before fetching");
        self.context.wait_for_insert(local).await;
        self.context.ensure_live()?;
        self.context.node(local)
    }

    /// Finds a node of the destination entity whose inverse relationship
    /// already contains `local`.
    fn resolve_inverse_locally(
        &self,
        local: LocalId,
        relationship: &RelationshipDescription,
    ) -> Option<LocalId> {
        let inverse = self.context.catalog().inverse_of(relationship)?;
        let graph = self.context.graph();
        graph
            .query(&relationship.destination, &Predicate::All, QueryWindow::default())
            .into_iter()
            .find(|candidate| {
                graph.get(*candidate).is_some_and(|node| {
                    node.relationship(&inverse.name)
                        .is_some_and(|value| value.contains(local))
                })
            })
    }
}

fn remote_failure(cause: TransportError) -> SyncError {
    SyncError::RemoteFetchFailed { cause }
}

fn local_value(node: &CachedNode, relationship: &RelationshipDescription) -> RelationshipValue {
    node.relationship(&relationship.name)
        .cloned()
        .unwrap_or_else(|| RelationshipValue::empty(relationship.cardinality))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_transitions() {
        use FetchState::*;
        assert!(NotStarted.can_transition_to(RequestBuilt));
        assert!(RequestBuilt.can_transition_to(InFlight));
        assert!(InFlight.can_transition_to(Decoded));
        assert!(Decoded.can_transition_to(Merged));
        assert!(InFlight.can_transition_to(Failed));
        assert!(NotStarted.can_transition_to(Failed));

        assert!(!NotStarted.can_transition_to(InFlight));
        assert!(!Merged.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(NotStarted));
        assert!(!Decoded.can_transition_to(InFlight));
    }

    #[test]
    fn tracker_rejects_invalid_transitions() {
        let mut tracker = FetchTracker::new("test");
        tracker.advance(FetchState::RequestBuilt).unwrap();
        let err = tracker.advance(FetchState::Merged).unwrap_err();
        assert_eq!(
            err,
            SyncError::InvalidStateTransition {
                from: "RequestBuilt".into(),
                to: "Merged".into(),
            }
        );
        tracker.advance(FetchState::Failed).unwrap();
        assert!(tracker.advance(FetchState::Failed).is_err());
    }
}
