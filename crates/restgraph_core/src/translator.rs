//! Translation between wire representations and typed node state.
//!
//! Wire records are JSON objects. The translator never touches the graph;
//! it only answers questions about a record in the light of the catalog:
//! which resource it identifies, which attributes it carries, which
//! relationships it mentions, and how to render a node back for a write.

use crate::catalog::{AttributeKind, Catalog, Cardinality};
use crate::error::{CoreResult, RepresentationError};
use crate::inflector::Inflector;
use crate::node::CachedNode;
use crate::value::AttributeValue;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// A single wire record.
pub type Record = Map<String, Value>;

/// Keys tried, in order, for a record's resource identifier.
pub const RESOURCE_ID_KEYS: [&str; 5] = ["id", "_id", "identifier", "url", "URL"];

/// Attributes decoded from one record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedAttributes {
    /// Values for catalog attributes present in the record.
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Fields that were present but could not be decoded.
    pub errors: Vec<RepresentationError>,
}

/// Wire value of one relationship, normalized to its cardinality.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationshipRepresentation {
    /// To-one: an object, a resource identifier, or null.
    ToOne(Value),
    /// To-many: zero or more objects or resource identifiers.
    ToMany(Vec<Value>),
}

/// Decodes wire records against a catalog.
#[derive(Clone)]
pub struct Translator {
    catalog: Arc<Catalog>,
    inflector: Arc<dyn Inflector>,
}

impl Translator {
    /// Creates a translator.
    pub fn new(catalog: Arc<Catalog>, inflector: Arc<dyn Inflector>) -> Self {
        Self { catalog, inflector }
    }

    /// The catalog records are decoded against.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// `pluralize(lowercase(entity))`: the collection path segment and the
    /// plural wrapper key.
    pub fn collection_name(&self, entity: &str) -> String {
        self.inflector.pluralize(&entity.to_lowercase())
    }

    /// Extracts the resource identifier from a record.
    pub fn resource_identifier_of(record: &Record) -> Option<String> {
        RESOURCE_ID_KEYS
            .iter()
            .filter_map(|key| record.get(*key))
            .find_map(identifier_text)
    }

    /// Decodes the catalog attributes present in a record.
    ///
    /// A date field that fails to parse is dropped and reported; the other
    /// fields are unaffected.
    pub fn attributes_of(&self, record: &Record, entity: &str) -> CoreResult<DecodedAttributes> {
        let description = self.catalog.require_entity(entity)?;
        let mut decoded = DecodedAttributes::default();

        for attribute in &description.attributes {
            let Some(raw) = record.get(&attribute.name) else {
                continue;
            };
            match decode_attribute(raw, attribute.kind) {
                Ok(value) => {
                    decoded.attributes.insert(attribute.name.clone(), value);
                }
                Err(message) => decoded.errors.push(RepresentationError::field(
                    entity,
                    attribute.name.clone(),
                    message,
                )),
            }
        }

        Ok(decoded)
    }

    /// Returns the catalog relationships mentioned in a record.
    ///
    /// Relationships absent from the record are omitted. `null` is kept so
    /// that callers can clear the relationship.
    pub fn relationships_of(
        &self,
        record: &Record,
        entity: &str,
    ) -> CoreResult<BTreeMap<String, RelationshipRepresentation>> {
        let description = self.catalog.require_entity(entity)?;
        let mut relationships = BTreeMap::new();

        for relationship in &description.relationships {
            let Some(raw) = record.get(&relationship.name) else {
                continue;
            };
            let representation = match relationship.cardinality {
                Cardinality::ToMany => RelationshipRepresentation::ToMany(match raw {
                    Value::Null => Vec::new(),
                    Value::Array(items) => items.clone(),
                    other => vec![other.clone()],
                }),
                Cardinality::ToOne => RelationshipRepresentation::ToOne(match raw {
                    Value::Array(items) => items.last().cloned().unwrap_or(Value::Null),
                    other => other.clone(),
                }),
            };
            relationships.insert(relationship.name.clone(), representation);
        }

        Ok(relationships)
    }

    /// Renders a node's attributes for a write.
    ///
    /// With `changed`, only those catalog attributes are rendered. Unset
    /// attributes are sent as `null`.
    pub fn to_wire_attributes(
        &self,
        node: &CachedNode,
        changed: Option<&BTreeSet<String>>,
    ) -> CoreResult<Record> {
        let description = self.catalog.require_entity(&node.entity)?;
        let mut wire = Record::new();

        for name in description.attribute_names() {
            if changed.is_some_and(|changed| !changed.contains(name)) {
                continue;
            }
            let value = node
                .attribute(name)
                .map_or(Value::Null, AttributeValue::to_json);
            wire.insert(name.to_string(), value);
        }

        Ok(wire)
    }

    /// Strips a root wrapper from a response body.
    ///
    /// Arrays pass through. Objects are tried as `{"artist": {...}}`, then as
    /// `{"artists": [...]}`; anything else is returned unchanged.
    pub fn unwrap_collection(&self, entity: &str, response: Value) -> Value {
        let Value::Object(mut object) = response else {
            return response;
        };

        let singular = entity.to_lowercase();
        if object.get(&singular).is_some_and(Value::is_object) {
            if let Some(inner) = object.remove(&singular) {
                return inner;
            }
        }

        let plural = self.collection_name(entity);
        if object.get(&plural).is_some_and(Value::is_array) {
            if let Some(inner) = object.remove(&plural) {
                return inner;
            }
        }

        Value::Object(object)
    }

    /// Flattens an unwrapped response into records.
    ///
    /// Non-object array elements are reported and skipped. `null`, `{}` and
    /// `[]` yield nothing.
    pub fn representations_of(
        entity: &str,
        value: Value,
    ) -> (Vec<Record>, Vec<RepresentationError>) {
        let mut records = Vec::new();
        let mut errors = Vec::new();

        match value {
            Value::Null => {}
            Value::Object(record) => {
                if !record.is_empty() {
                    records.push(record);
                }
            }
            Value::Array(items) => {
                for (index, item) in items.into_iter().enumerate() {
                    match item {
                        Value::Object(record) => records.push(record),
                        other => errors.push(RepresentationError::element(
                            entity,
                            format!("element {index} is not an object: {other}"),
                        )),
                    }
                }
            }
            other => errors.push(RepresentationError::element(
                entity,
                format!("expected an object or array, got {other}"),
            )),
        }

        (records, errors)
    }
}

impl std::fmt::Debug for Translator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Translator")
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

/// Renders an identifier candidate as text. Null, arrays and objects are not
/// identifiers.
pub fn identifier_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn decode_attribute(raw: &Value, kind: AttributeKind) -> Result<AttributeValue, String> {
    match (kind, raw) {
        (_, Value::Null) => Ok(AttributeValue::Null),
        (AttributeKind::Date, Value::String(text)) => parse_date(text)
            .map(AttributeValue::Date)
            .ok_or_else(|| format!("unparseable date {text:?}")),
        (AttributeKind::Date, other) => Err(format!("expected a date string, got {other}")),
        (AttributeKind::Float, Value::Number(n)) => {
            Ok(n.as_f64().map_or(AttributeValue::Null, AttributeValue::Float))
        }
        (AttributeKind::Json, other) => Ok(AttributeValue::Json(other.clone())),
        (_, other) => Ok(AttributeValue::from_json(other)),
    }
}

fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
