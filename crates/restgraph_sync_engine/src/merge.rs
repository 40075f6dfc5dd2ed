//! Merging wire records into the local graph.
//!
//! A record overwrites the attributes it carries (bumping the node's
//! version once) and replaces the relationships it mentions. Relationship
//! values are merged recursively: nested objects are records of the
//! destination entity, bare strings and numbers are references to resources
//! of the destination entity. References to unknown resources create empty
//! version-0 nodes that a later fault fills in.
//!
//! Unsaved local edits win: attributes and relationships named in a pending
//! update are left alone, and a node with a pending insert keeps everything.

use crate::context::SyncContext;
use crate::write_back::PendingChange;
use restgraph_core::{
    identifier_text, CachedNode, CoreError, CoreResult, LocalId, Record,
    RelationshipRepresentation, RelationshipValue, RepresentationError, Translator,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Merges records into one context, collecting non-fatal decode errors.
pub(crate) struct Merger<'a> {
    context: &'a SyncContext,
    errors: Vec<CoreError>,
    // Nodes whose version was already bumped in this pass.
    bumped: HashSet<LocalId>,
}

impl<'a> Merger<'a> {
    pub(crate) fn new(context: &'a SyncContext) -> Self {
        Self {
            context,
            errors: Vec::new(),
            bumped: HashSet::new(),
        }
    }

    /// Field and element errors seen so far.
    pub(crate) fn into_errors(self) -> Vec<CoreError> {
        self.errors
    }

    pub(crate) fn record_error(&mut self, error: impl Into<CoreError>) {
        let error = error.into();
        warn!(error = %error, "skipping undecodable representation");
        self.errors.push(error);
    }

    /// Resolves a record to its local identity and merges it.
    ///
    /// Returns `None`, after a warning, for records without a resource
    /// identifier.
    pub(crate) fn merge_record(
        &mut self,
        entity: &str,
        record: &Record,
        last_modified: Option<&str>,
    ) -> CoreResult<Option<LocalId>> {
        let Some(resource_id) = Translator::resource_identifier_of(record) else {
            warn!(entity, "skipping record without a resource identifier");
            return Ok(None);
        };
        let local = self
            .context
            .registry()
            .local_identity_for(&resource_id, entity);
        self.apply_record(local, entity, record, last_modified)?;
        Ok(Some(local))
    }

    /// Merges a record into a known local identity.
    ///
    /// The node's version moves at most once per merger, however often the
    /// record is reached through nested back-references.
    pub(crate) fn apply_record(
        &mut self,
        local: LocalId,
        entity: &str,
        record: &Record,
        last_modified: Option<&str>,
    ) -> CoreResult<()> {
        let context = self.context;
        let translator = context.translator();
        let decoded = translator.attributes_of(record, entity)?;
        for error in decoded.errors {
            self.record_error(error);
        }

        let mut relationships = BTreeMap::new();
        for (name, representation) in translator.relationships_of(record, entity)? {
            let destination = context
                .catalog()
                .require_relationship(entity, &name)?
                .destination
                .clone();
            let value = match representation {
                RelationshipRepresentation::ToOne(value) => {
                    RelationshipValue::ToOne(self.resolve_reference(&destination, &value)?)
                }
                RelationshipRepresentation::ToMany(values) => {
                    let mut members = Vec::with_capacity(values.len());
                    for value in &values {
                        if let Some(member) = self.resolve_reference(&destination, value)? {
                            members.push(member);
                        }
                    }
                    RelationshipValue::to_many(members)
                }
            };
            relationships.insert(name, value);
        }

        let graph = context.graph();
        let mut node = graph
            .get(local)
            .unwrap_or_else(|| CachedNode::new(local, entity));
        if let Some(resource_id) = context.registry().identifier_for(local) {
            node.assign_resource_id(&resource_id)?;
        }
        let pending = context.pending_change(local);
        let attributes: BTreeMap<_, _> = decoded
            .attributes
            .into_iter()
            .filter(|(name, _)| !is_local_edit(pending.as_ref(), name))
            .collect();
        if self.bumped.insert(local) {
            node.apply_remote_attributes(attributes);
        } else {
            for (name, value) in attributes {
                node.set_attribute(name, value);
            }
        }
        if let Some(last_modified) = last_modified {
            node.last_modified = Some(last_modified.to_string());
        }
        for (name, value) in relationships {
            if is_local_edit(pending.as_ref(), &name) {
                continue;
            }
            node.set_relationship(name, value);
        }
        debug!(object = %local, entity, version = node.version(), "merged record");
        graph.put(node);
        Ok(())
    }

    /// Resolves one relationship element to a local identity.
    fn resolve_reference(&mut self, entity: &str, value: &Value) -> CoreResult<Option<LocalId>> {
        match value {
            Value::Null => Ok(None),
            Value::Object(record) => {
                let merged = self.merge_record(entity, record, None)?;
                if merged.is_none() {
                    self.record_error(RepresentationError::element(
                        entity,
                        "nested record has no resource identifier",
                    ));
                }
                Ok(merged)
            }
            other => match identifier_text(other) {
                Some(resource_id) => Ok(Some(self.stub_for(entity, &resource_id))),
                None => {
                    self.record_error(RepresentationError::element(
                        entity,
                        format!("unusable relationship reference: {other}"),
                    ));
                    Ok(None)
                }
            },
        }
    }

    /// Local identity for a referenced resource, creating an empty node if
    /// the graph has none yet.
    fn stub_for(&self, entity: &str, resource_id: &str) -> LocalId {
        let local = self
            .context
            .registry()
            .local_identity_for(resource_id, entity);
        let graph = self.context.graph();
        if graph.get(local).is_none() {
            graph.put(CachedNode::with_resource_id(local, entity, resource_id));
        }
        local
    }
}

/// Returns true if the user changed `name` and has not saved it yet.
fn is_local_edit(pending: Option<&PendingChange>, name: &str) -> bool {
    match pending {
        Some(PendingChange::Insert) => true,
        Some(PendingChange::Update { changed }) => changed.contains(name),
        Some(PendingChange::Delete) | None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restgraph_core::{AttributeKind, AttributeValue, Catalog, EntityDescription};
    use serde_json::json;

    fn context() -> SyncContext {
        SyncContext::in_memory(
            Catalog::new()
                .with_entity(
                    EntityDescription::new("Artist")
                        .with_attribute("name", AttributeKind::String)
                        .with_to_many("songs", "Song", Some("artist")),
                )
                .with_entity(
                    EntityDescription::new("Song")
                        .with_attribute("title", AttributeKind::String)
                        .with_to_one("artist", "Artist", Some("songs")),
                ),
        )
    }

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn merge_creates_and_reuses_nodes() {
        let ctx = context();
        let mut merger = Merger::new(&ctx);

        let first = merger
            .merge_record("Artist", &record(json!({"id": 1, "name": "A"})), Some("today"))
            .unwrap()
            .unwrap();
        let second = merger
            .merge_record("Artist", &record(json!({"id": 1, "name": "B"})), None)
            .unwrap()
            .unwrap();
        assert_eq!(first, second);

        let node = ctx.graph().get(first).unwrap();
        assert_eq!(node.version(), 2);
        assert_eq!(node.resource_id(), Some("1"));
        assert_eq!(node.attribute("name"), Some(&AttributeValue::from("B")));
        assert_eq!(node.last_modified.as_deref(), Some("today"));
    }

    #[test]
    fn records_without_identifier_are_skipped() {
        let ctx = context();
        let mut merger = Merger::new(&ctx);
        let merged = merger
            .merge_record("Artist", &record(json!({"name": "A"})), None)
            .unwrap();
        assert!(merged.is_none());
        assert!(ctx.graph().is_empty());
    }

    #[test]
    fn nested_relationships_merge_recursively() {
        let ctx = context();
        let mut merger = Merger::new(&ctx);
        let artist = merger
            .merge_record(
                "Artist",
                &record(json!({
                    "id": 1,
                    "songs": [{"id": 10, "title": "One"}, 11, {"title": "anonymous"}, 10]
                })),
                None,
            )
            .unwrap()
            .unwrap();

        let node = ctx.graph().get(artist).unwrap();
        let songs = node.relationship("songs").unwrap().ids();
        assert_eq!(songs.len(), 2);

        let one = ctx.graph().get(songs[0]).unwrap();
        assert_eq!(one.version(), 1);
        assert_eq!(one.attribute("title"), Some(&AttributeValue::from("One")));

        let stub = ctx.graph().get(songs[1]).unwrap();
        assert_eq!(stub.version(), 0);
        assert_eq!(stub.resource_id(), Some("11"));

        assert_eq!(merger.into_errors().len(), 1);
    }

    #[test]
    fn null_clears_relationships() {
        let ctx = context();
        let mut merger = Merger::new(&ctx);
        let song = merger
            .merge_record("Song", &record(json!({"id": 5, "artist": 1})), None)
            .unwrap()
            .unwrap();
        assert!(matches!(
            ctx.graph().get(song).unwrap().relationship("artist"),
            Some(RelationshipValue::ToOne(Some(_)))
        ));

        merger
            .merge_record("Song", &record(json!({"id": 5, "artist": null})), None)
            .unwrap();
        assert_eq!(
            ctx.graph().get(song).unwrap().relationship("artist"),
            Some(&RelationshipValue::ToOne(None))
        );
    }

    #[test]
    fn back_references_bump_version_once() {
        let ctx = context();
        let mut merger = Merger::new(&ctx);
        let artist = merger
            .merge_record(
                "Artist",
                &record(json!({
                    "id": 42,
                    "songs": [{"id": "s1", "artist": {"id": 42, "name": "A"}}]
                })),
                None,
            )
            .unwrap()
            .unwrap();

        let node = ctx.graph().get(artist).unwrap();
        assert_eq!(node.version(), 1);
        assert_eq!(node.attribute("name"), Some(&AttributeValue::from("A")));
        assert_eq!(ctx.graph().len(), 2);
    }

    #[test]
    fn unsaved_edits_survive_a_merge() {
        let ctx = context();
        let mut merger = Merger::new(&ctx);
        let artist = merger
            .merge_record("Artist", &record(json!({"id": 1, "name": "Remote"})), None)
            .unwrap()
            .unwrap();

        let mut node = ctx.graph().get(artist).unwrap();
        node.set_attribute("name", "Local".into());
        ctx.graph().put(node);
        ctx.record_update(artist, "name");

        let mut merger = Merger::new(&ctx);
        merger
            .merge_record("Artist", &record(json!({"id": 1, "name": "Remote 2"})), None)
            .unwrap();

        let node = ctx.graph().get(artist).unwrap();
        assert_eq!(node.attribute("name"), Some(&AttributeValue::from("Local")));
        assert_eq!(node.version(), 2);
    }

    #[test]
    fn local_edit_rules() {
        let update = PendingChange::update(["name"]);
        assert!(is_local_edit(Some(&update), "name"));
        assert!(!is_local_edit(Some(&update), "songs"));
        assert!(is_local_edit(Some(&PendingChange::Insert), "songs"));
        assert!(!is_local_edit(Some(&PendingChange::Delete), "name"));
        assert!(!is_local_edit(None, "name"));
    }
}
