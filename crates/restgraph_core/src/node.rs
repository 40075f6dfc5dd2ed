//! Cached nodes: the local materialization of remote resources.

use crate::catalog::Cardinality;
use crate::error::{CoreError, CoreResult};
use crate::id::LocalId;
use crate::value::AttributeValue;
use std::collections::BTreeMap;

/// Value of one relationship on a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationshipValue {
    /// To-one: the related object, if any.
    ToOne(Option<LocalId>),
    /// To-many: ordered members, never containing duplicates.
    ToMany(Vec<LocalId>),
}

impl RelationshipValue {
    /// Builds a to-many value, dropping duplicates but keeping first-seen order.
    pub fn to_many(ids: impl IntoIterator<Item = LocalId>) -> Self {
        let mut members: Vec<LocalId> = Vec::new();
        for id in ids {
            if !members.contains(&id) {
                members.push(id);
            }
        }
        Self::ToMany(members)
    }

    /// The empty value for a cardinality.
    pub fn empty(cardinality: Cardinality) -> Self {
        match cardinality {
            Cardinality::ToOne => Self::ToOne(None),
            Cardinality::ToMany => Self::ToMany(Vec::new()),
        }
    }

    /// Returns true if `id` is the target (to-one) or a member (to-many).
    pub fn contains(&self, id: LocalId) -> bool {
        match self {
            Self::ToOne(target) => *target == Some(id),
            Self::ToMany(members) => members.contains(&id),
        }
    }

    /// Removes `id` from the value. Returns true if it was present.
    pub fn remove(&mut self, id: LocalId) -> bool {
        match self {
            Self::ToOne(target) if *target == Some(id) => {
                *target = None;
                true
            }
            Self::ToOne(_) => false,
            Self::ToMany(members) => {
                let before = members.len();
                members.retain(|member| *member != id);
                members.len() != before
            }
        }
    }

    /// All referenced identities, in order.
    pub fn ids(&self) -> Vec<LocalId> {
        match self {
            Self::ToOne(target) => target.iter().copied().collect(),
            Self::ToMany(members) => members.clone(),
        }
    }
}

/// The local materialization of one remote resource.
///
/// `resource_id` and `version` are only reachable through methods so their
/// invariants hold: an assigned resource identifier never changes, and the
/// version moves only when a remote response overwrites attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedNode {
    /// Local identity, stable for the node's lifetime.
    pub local_id: LocalId,
    /// Entity name in the catalog.
    pub entity: String,
    /// Attribute values, restricted to the entity's attribute catalog.
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Diagnostic `Last-Modified` value from the remote service.
    pub last_modified: Option<String>,
    relationships: BTreeMap<String, RelationshipValue>,
    resource_id: Option<String>,
    version: u64,
}

impl CachedNode {
    /// Creates an empty, unidentified node.
    pub fn new(local_id: LocalId, entity: impl Into<String>) -> Self {
        Self {
            local_id,
            entity: entity.into(),
            attributes: BTreeMap::new(),
            last_modified: None,
            relationships: BTreeMap::new(),
            resource_id: None,
            version: 0,
        }
    }

    /// Creates an empty node already bound to a resource identifier.
    pub fn with_resource_id(
        local_id: LocalId,
        entity: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        let mut node = Self::new(local_id, entity);
        node.resource_id = Some(resource_id.into());
        node
    }

    /// The remote identifier, once known.
    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id.as_deref()
    }

    /// Number of remote attribute overwrites so far.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Assigns the resource identifier.
    ///
    /// Re-assigning the same identifier is a no-op; a different one fails with
    /// `IdentityConflict` and leaves the node untouched.
    pub fn assign_resource_id(&mut self, resource_id: &str) -> CoreResult<()> {
        match &self.resource_id {
            Some(existing) if existing != resource_id => Err(CoreError::IdentityConflict {
                local: self.local_id,
                existing: existing.clone(),
                attempted: resource_id.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                self.resource_id = Some(resource_id.to_string());
                Ok(())
            }
        }
    }

    /// Overwrites attributes from a remote response and bumps the version.
    ///
    /// Keys not present in `attributes` keep their current value.
    pub fn apply_remote_attributes(&mut self, attributes: BTreeMap<String, AttributeValue>) {
        self.attributes.extend(attributes);
        self.version += 1;
    }

    /// Reads an attribute.
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Sets an attribute locally. Does not touch the version.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: AttributeValue) {
        self.attributes.insert(name.into(), value);
    }

    /// Reads a relationship.
    pub fn relationship(&self, name: &str) -> Option<&RelationshipValue> {
        self.relationships.get(name)
    }

    /// Sets a relationship. To-many values are deduplicated.
    pub fn set_relationship(&mut self, name: impl Into<String>, value: RelationshipValue) {
        let value = match value {
            RelationshipValue::ToMany(members) => RelationshipValue::to_many(members),
            to_one => to_one,
        };
        self.relationships.insert(name.into(), value);
    }

    /// All relationships that have been set.
    pub fn relationships(&self) -> &BTreeMap<String, RelationshipValue> {
        &self.relationships
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_id_is_immutable() {
        let mut node = CachedNode::new(LocalId::new(), "Artist");
        assert_eq!(node.resource_id(), None);

        node.assign_resource_id("42").unwrap();
        node.assign_resource_id("42").unwrap();
        assert_eq!(node.resource_id(), Some("42"));

        let err = node.assign_resource_id("43").unwrap_err();
        assert!(matches!(err, CoreError::IdentityConflict { .. }));
        assert_eq!(node.resource_id(), Some("42"));
    }

    #[test]
    fn remote_overwrite_bumps_version_once() {
        let mut node = CachedNode::new(LocalId::new(), "Artist");
        node.set_attribute("name", "local".into());
        assert_eq!(node.version(), 0);

        let mut attrs = BTreeMap::new();
        attrs.insert("name".to_string(), AttributeValue::from("remote"));
        node.apply_remote_attributes(attrs);

        assert_eq!(node.version(), 1);
        assert_eq!(node.attribute("name"), Some(&AttributeValue::from("remote")));
    }

    #[test]
    fn remove_clears_targets_and_members() {
        let a = LocalId::new();
        let b = LocalId::new();

        let mut to_one = RelationshipValue::ToOne(Some(a));
        assert!(!to_one.remove(b));
        assert!(to_one.remove(a));
        assert_eq!(to_one, RelationshipValue::ToOne(None));

        let mut to_many = RelationshipValue::to_many([a, b]);
        assert!(to_many.remove(a));
        assert!(!to_many.remove(a));
        assert_eq!(to_many.ids(), vec![b]);
    }

    #[test]
    fn to_many_deduplicates() {
        let a = LocalId::new();
        let b = LocalId::new();
        let mut node = CachedNode::new(LocalId::new(), "Artist");
        node.set_relationship("songs", RelationshipValue::ToMany(vec![a, b, a]));

        assert_eq!(node.relationship("songs").unwrap().ids(), vec![a, b]);
        assert!(node.relationship("songs").unwrap().contains(b));
    }

    #[test]
    fn empty_values() {
        assert_eq!(
            RelationshipValue::empty(Cardinality::ToOne),
            RelationshipValue::ToOne(None)
        );
        assert!(RelationshipValue::empty(Cardinality::ToMany).ids().is_empty());
    }
}
