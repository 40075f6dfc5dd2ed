//! CLI command implementations.

pub mod fetch;
pub mod related;
pub mod show;

use restgraph_core::{CachedNode, Catalog, LocalId, RelationshipValue};
use restgraph_sync_engine::{HttpTransport, IncrementalStore, SyncConfig};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Loads a catalog from its JSON file.
pub fn load_catalog(path: &Path) -> Result<Catalog, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read catalog {:?}: {}", path, e))?;
    Ok(Catalog::from_json(&text)?)
}

/// Builds the sync configuration for a pagination style.
pub fn config_for(base_url: &str, pagination: &str) -> Result<SyncConfig, Box<dyn std::error::Error>> {
    let config = SyncConfig::new(base_url);
    match pagination {
        "none" => Ok(config.without_pagination()),
        "limit-offset" => Ok(config.with_limit_offset()),
        "page" => Ok(config.with_page_per_page()),
        other => Err(format!("Unknown pagination style: {}", other).into()),
    }
}

/// Opens a store over HTTP.
pub fn open_store(
    catalog: Catalog,
    config: &SyncConfig,
) -> Result<IncrementalStore, Box<dyn std::error::Error>> {
    let transport = HttpTransport::new(config)?;
    Ok(IncrementalStore::new(catalog, config, Arc::new(transport)))
}

/// Printable form of a cached node.
#[derive(Debug, Serialize)]
pub struct NodeView {
    /// Entity name.
    pub entity: String,
    /// Remote identifier, if known.
    pub id: Option<String>,
    /// Local identity.
    pub local_id: String,
    /// Attribute version; 0 means never loaded.
    pub version: u64,
    /// Attribute values as JSON.
    pub attributes: BTreeMap<String, Value>,
    /// Relationship targets by resource identifier.
    pub relationships: BTreeMap<String, Value>,
}

impl NodeView {
    /// Renders a node, naming relationship targets by their resource
    /// identifiers where the store knows them.
    pub fn new(store: &IncrementalStore, node: &CachedNode) -> Self {
        let relationships = node
            .relationships()
            .iter()
            .map(|(name, value)| (name.clone(), relationship_json(store, value)))
            .collect();
        Self {
            entity: node.entity.clone(),
            id: node.resource_id().map(str::to_string),
            local_id: node.local_id.to_string(),
            version: node.version(),
            attributes: node
                .attributes
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect(),
            relationships,
        }
    }

    /// Prints the view in the requested format.
    pub fn print(&self, format: &str) -> Result<(), Box<dyn std::error::Error>> {
        match format {
            "json" => println!("{}", serde_json::to_string(self)?),
            _ => {
                println!(
                    "{} {} (v{})",
                    self.entity,
                    self.id.as_deref().unwrap_or("<unsaved>"),
                    self.version
                );
                for (name, value) in &self.attributes {
                    println!("  {}: {}", name, value);
                }
                for (name, value) in &self.relationships {
                    println!("  {} -> {}", name, value);
                }
            }
        }
        Ok(())
    }
}

/// Resource identifier of a local object, or its local identity.
pub fn display_id(store: &IncrementalStore, local: LocalId) -> String {
    store
        .context()
        .registry()
        .identifier_for(local)
        .unwrap_or_else(|| local.to_string())
}

fn relationship_json(store: &IncrementalStore, value: &RelationshipValue) -> Value {
    match value {
        RelationshipValue::ToOne(None) => Value::Null,
        RelationshipValue::ToOne(Some(local)) => Value::String(display_id(store, *local)),
        RelationshipValue::ToMany(members) => members
            .iter()
            .map(|local| Value::String(display_id(store, *local)))
            .collect(),
    }
}
