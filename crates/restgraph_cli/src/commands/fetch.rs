//! Fetch command implementation.

use super::{open_store, NodeView};
use restgraph_core::{Catalog, Query};
use restgraph_sync_engine::SyncConfig;
use tracing::warn;

/// Runs the fetch command.
pub async fn run(
    catalog: Catalog,
    config: &SyncConfig,
    entity: &str,
    limit: u64,
    offset: u64,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(catalog, config)?;
    let query = Query::all(entity).with_limit(limit).with_offset(offset);

    let outcome = store.fetch_collection(&query).await?;
    for error in &outcome.errors {
        warn!(%error, "skipped part of the response");
    }

    for local in &outcome.fetched {
        if let Some(node) = store.node(*local) {
            NodeView::new(&store, &node).print(format)?;
        }
    }
    if format != "json" {
        println!("{} {} object(s)", outcome.fetched.len(), entity);
    }
    Ok(())
}
