//! Test fixtures for restgraph.

use restgraph_core::{AttributeKind, AttributeValue, Catalog, EntityDescription};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// A small music catalog used throughout the tests.
///
/// - `Artist`: `name`, `genre`, `born`; to-many `songs` and `albums`
/// - `Song`: `title`, `released`, `plays`, `explicit`, `rating`; to-one `artist`
/// - `Album`: `title`; to-one `artist`; to-many `songs` without an inverse
pub fn music_catalog() -> Catalog {
    Catalog::new()
        .with_entity(
            EntityDescription::new("Artist")
                .with_attribute("name", AttributeKind::String)
                .with_attribute("genre", AttributeKind::String)
                .with_attribute("born", AttributeKind::Date)
                .with_to_many("songs", "Song", Some("artist"))
                .with_to_many("albums", "Album", Some("artist")),
        )
        .with_entity(
            EntityDescription::new("Song")
                .with_attribute("title", AttributeKind::String)
                .with_attribute("released", AttributeKind::Date)
                .with_attribute("plays", AttributeKind::Integer)
                .with_attribute("explicit", AttributeKind::Boolean)
                .with_attribute("rating", AttributeKind::Float)
                .with_to_one("artist", "Artist", Some("songs")),
        )
        .with_entity(
            EntityDescription::new("Album")
                .with_attribute("title", AttributeKind::String)
                .with_to_one("artist", "Artist", Some("albums"))
                .with_to_many("songs", "Song", None),
        )
}

/// Wire record for an artist.
pub fn artist_record(id: &str, name: &str) -> Value {
    json!({ "id": id, "name": name })
}

/// Wire record for a song.
pub fn song_record(id: &str, title: &str) -> Value {
    json!({ "id": id, "title": title })
}

/// Builds an attribute map from string pairs.
pub fn string_attributes(pairs: &[(&str, &str)]) -> BTreeMap<String, AttributeValue> {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), AttributeValue::from(*value)))
        .collect()
}
