//! Read-only entity/relationship catalog.
//!
//! The catalog describes the shape of every entity the graph can hold: its
//! attribute names and kinds, and its relationships with their cardinality,
//! destination entity and inverse. It is consulted by the translator when
//! decoding wire records and by the coordinators when deciding whether a
//! relationship fault needs the network.
//!
//! Catalogs can be built in code or loaded from JSON:
//!
//! ```
//! use restgraph_core::Catalog;
//!
//! let catalog = Catalog::from_json(r#"{
//!     "entities": [
//!         { "name": "Artist",
//!           "attributes": [{ "name": "name", "kind": "string" }],
//!           "relationships": [
//!               { "name": "songs", "destination": "Song",
//!                 "cardinality": "to_many", "inverse": "artist" }
//!           ] }
//!     ]
//! }"#).unwrap();
//!
//! assert!(catalog.entity("Artist").unwrap().has_attribute("name"));
//! ```

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of an attribute value.
///
/// Only `Date` changes how values are translated; the other kinds are
/// descriptive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    /// UTF-8 text.
    String,
    /// Signed integer.
    Integer,
    /// Floating point number.
    Float,
    /// Boolean flag.
    Boolean,
    /// Timestamp, ISO-8601 on the wire.
    Date,
    /// Arbitrary nested JSON.
    Json,
}

/// One declared attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescription {
    /// Attribute name, identical to the wire key.
    pub name: String,
    /// Attribute kind.
    pub kind: AttributeKind,
}

/// Relationship cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// At most one related object.
    ToOne,
    /// An ordered set of related objects.
    ToMany,
}

/// One declared relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDescription {
    /// Relationship name, identical to the wire key and the path segment.
    pub name: String,
    /// Destination entity name.
    pub destination: String,
    /// To-one or to-many.
    pub cardinality: Cardinality,
    /// Name of the inverse relationship on the destination entity.
    #[serde(default)]
    pub inverse: Option<String>,
}

impl RelationshipDescription {
    /// Returns true for to-many relationships.
    pub fn is_to_many(&self) -> bool {
        self.cardinality == Cardinality::ToMany
    }
}

/// Shape of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescription {
    /// Entity name, e.g. `Artist`.
    pub name: String,
    /// Declared attributes.
    #[serde(default)]
    pub attributes: Vec<AttributeDescription>,
    /// Declared relationships.
    #[serde(default)]
    pub relationships: Vec<RelationshipDescription>,
}

impl EntityDescription {
    /// Creates an entity with no attributes or relationships.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// Adds an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, kind: AttributeKind) -> Self {
        self.attributes.push(AttributeDescription {
            name: name.into(),
            kind,
        });
        self
    }

    /// Adds a to-one relationship.
    pub fn with_to_one(
        mut self,
        name: impl Into<String>,
        destination: impl Into<String>,
        inverse: Option<&str>,
    ) -> Self {
        self.relationships.push(RelationshipDescription {
            name: name.into(),
            destination: destination.into(),
            cardinality: Cardinality::ToOne,
            inverse: inverse.map(str::to_string),
        });
        self
    }

    /// Adds a to-many relationship.
    pub fn with_to_many(
        mut self,
        name: impl Into<String>,
        destination: impl Into<String>,
        inverse: Option<&str>,
    ) -> Self {
        self.relationships.push(RelationshipDescription {
            name: name.into(),
            destination: destination.into(),
            cardinality: Cardinality::ToMany,
            inverse: inverse.map(str::to_string),
        });
        self
    }

    /// Looks up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&AttributeDescription> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Returns true if the attribute is declared.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// Iterates over declared attribute names.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.name.as_str())
    }

    /// Looks up a relationship by name.
    pub fn relationship(&self, name: &str) -> Option<&RelationshipDescription> {
        self.relationships.iter().find(|r| r.name == name)
    }
}

#[derive(Deserialize)]
struct CatalogFile {
    entities: Vec<EntityDescription>,
}

/// The set of entities known to one graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    entities: BTreeMap<String, EntityDescription>,
}

impl Catalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) an entity.
    pub fn with_entity(mut self, entity: EntityDescription) -> Self {
        self.entities.insert(entity.name.clone(), entity);
        self
    }

    /// Parses a catalog from its JSON form (`{"entities": [...]}`).
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Ok(file
            .entities
            .into_iter()
            .fold(Self::new(), |catalog, entity| catalog.with_entity(entity)))
    }

    /// Looks up an entity by name.
    pub fn entity(&self, name: &str) -> Option<&EntityDescription> {
        self.entities.get(name)
    }

    /// Looks up an entity, failing with `UnknownEntity`.
    pub fn require_entity(&self, name: &str) -> CoreResult<&EntityDescription> {
        self.entity(name)
            .ok_or_else(|| CoreError::UnknownEntity(name.to_string()))
    }

    /// Looks up a relationship, failing with `UnknownEntity` or
    /// `UnknownRelationship`.
    pub fn require_relationship(
        &self,
        entity: &str,
        relationship: &str,
    ) -> CoreResult<&RelationshipDescription> {
        self.require_entity(entity)?
            .relationship(relationship)
            .ok_or_else(|| CoreError::UnknownRelationship {
                entity: entity.to_string(),
                relationship: relationship.to_string(),
            })
    }

    /// Returns the inverse of a relationship, if one is declared and exists
    /// on the destination entity.
    pub fn inverse_of(&self, relationship: &RelationshipDescription) -> Option<&RelationshipDescription> {
        let inverse = relationship.inverse.as_deref()?;
        self.entity(&relationship.destination)?.relationship(inverse)
    }

    /// Iterates over all entities.
    pub fn entities(&self) -> impl Iterator<Item = &EntityDescription> {
        self.entities.values()
    }
}
