//! Show command implementation.

use super::{open_store, NodeView};
use restgraph_core::{CachedNode, Catalog, LocalId};
use restgraph_sync_engine::{IncrementalStore, SyncConfig};

/// Runs the show command.
pub async fn run(
    catalog: Catalog,
    config: &SyncConfig,
    entity: &str,
    id: &str,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(catalog, config)?;
    let local = reference(&store, entity, id)?;
    let node = store.fault_object(local).await?;
    NodeView::new(&store, &node).print(format)
}

/// Local identity for a remote object, with an empty node the first fault
/// fills in.
pub fn reference(
    store: &IncrementalStore,
    entity: &str,
    id: &str,
) -> Result<LocalId, Box<dyn std::error::Error>> {
    store.catalog().require_entity(entity)?;
    let context = store.context();
    let local = context.registry().local_identity_for(id, entity);
    if context.graph().get(local).is_none() {
        context
            .graph()
            .put(CachedNode::with_resource_id(local, entity, id));
    }
    Ok(local)
}
