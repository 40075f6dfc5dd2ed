//! Related command implementation.

use super::{display_id, open_store, show::reference, NodeView};
use restgraph_core::Catalog;
use restgraph_sync_engine::SyncConfig;

/// Runs the related command.
pub async fn run(
    catalog: Catalog,
    config: &SyncConfig,
    entity: &str,
    id: &str,
    relationship: &str,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(catalog, config)?;
    let local = reference(&store, entity, id)?;
    let value = store.fault_relationship(local, relationship).await?;

    for target in value.ids() {
        match store.node(target) {
            Some(node) => NodeView::new(&store, &node).print(format)?,
            None => println!("{}", display_id(&store, target)),
        }
    }
    Ok(())
}
