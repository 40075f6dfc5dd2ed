//! Property-based test generators using proptest.

use chrono::{DateTime, Utc};
use proptest::prelude::*;
use restgraph_core::{AttributeKind, AttributeValue, EntityDescription, QueryWindow};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Strategy for resource identifiers as the wire spells them.
pub fn resource_id_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        (1u32..1_000_000).prop_map(|n| n.to_string()),
        prop::string::string_regex("[a-z][a-z0-9-]{0,15}").expect("Invalid regex"),
    ]
}

/// Strategy for query windows. A zero limit means unlimited.
pub fn window_strategy() -> impl Strategy<Value = QueryWindow> {
    (0u64..200, 0u64..50).prop_map(|(offset, limit)| QueryWindow::new(offset, limit))
}

/// Strategy for timestamps with millisecond precision, which is what the
/// wire format preserves.
pub fn date_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    // 1900-01-01 .. 2100-01-01
    (-2_208_988_800_000i64..4_102_444_800_000)
        .prop_filter_map("out of range", DateTime::from_timestamp_millis)
}

/// Strategy for a non-null value of the given kind.
pub fn attribute_value_strategy(kind: AttributeKind) -> BoxedStrategy<AttributeValue> {
    match kind {
        AttributeKind::String => ".{0,24}".prop_map(AttributeValue::String).boxed(),
        AttributeKind::Integer => any::<i64>().prop_map(AttributeValue::Integer).boxed(),
        AttributeKind::Float => (-1.0e12f64..1.0e12)
            .prop_map(AttributeValue::Float)
            .boxed(),
        AttributeKind::Boolean => any::<bool>().prop_map(AttributeValue::Bool).boxed(),
        AttributeKind::Date => date_strategy().prop_map(AttributeValue::Date).boxed(),
        AttributeKind::Json => json_strategy().prop_map(AttributeValue::Json).boxed(),
    }
}

/// Strategy for nested JSON attribute payloads (always an array or object).
pub fn json_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        prop::collection::vec(any::<i32>(), 0..5).prop_map(|items| json!(items)),
        prop::collection::btree_map("[a-z]{1,6}", "[a-z ]{0,10}", 0..4)
            .prop_map(|map| json!(map)),
    ]
}

/// Strategy for a full attribute map of an entity. Every declared attribute
/// is present; some are null.
pub fn attributes_strategy(
    entity: &EntityDescription,
) -> BoxedStrategy<BTreeMap<String, AttributeValue>> {
    let mut strategy = Just(BTreeMap::new()).boxed();
    for attribute in &entity.attributes {
        let name = attribute.name.clone();
        let value = prop::option::weighted(0.85, attribute_value_strategy(attribute.kind))
            .prop_map(|value| value.unwrap_or(AttributeValue::Null));
        strategy = (strategy, value)
            .prop_map(move |(mut map, value)| {
                map.insert(name.clone(), value);
                map
            })
            .boxed();
    }
    strategy
}

/// Strategy for a page of artist records with distinct identifiers.
pub fn artist_page_strategy(max: usize) -> impl Strategy<Value = Vec<Value>> {
    prop::collection::btree_set(1u32..100_000, 0..=max).prop_map(|ids| {
        ids.into_iter()
            .map(|id| json!({ "id": id, "name": format!("artist-{id}") }))
            .collect()
    })
}
