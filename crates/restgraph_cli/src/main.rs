//! restgraph CLI
//!
//! Command-line tools for browsing a REST service through a local object
//! graph.
//!
//! # Commands
//!
//! - `fetch` - Fetch a collection and print its objects
//! - `show` - Fault one object by resource identifier
//! - `related` - Fault one relationship of an object

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// restgraph command-line tools.
#[derive(Parser)]
#[command(name = "restgraph")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the REST service
    #[arg(global = true, short, long)]
    base_url: Option<String>,

    /// Path to the catalog JSON file
    #[arg(global = true, short, long)]
    catalog: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a collection and print its objects
    Fetch {
        /// Entity name from the catalog
        entity: String,

        /// Maximum number of objects
        #[arg(short, long, default_value = "0")]
        limit: u64,

        /// Number of objects to skip
        #[arg(short, long, default_value = "0")]
        offset: u64,

        /// Pagination style (none, limit-offset, page)
        #[arg(short, long, default_value = "limit-offset")]
        pagination: String,

        /// Output format (json, text)
        #[arg(short, long, default_value = "json")]
        format: String,
    },

    /// Fault one object by resource identifier
    Show {
        /// Entity name from the catalog
        entity: String,

        /// Resource identifier
        id: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Fault one relationship of an object
    Related {
        /// Entity name from the catalog
        entity: String,

        /// Resource identifier
        id: String,

        /// Relationship name
        relationship: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Commands::Version = cli.command {
        println!("restgraph CLI v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let base_url = cli.base_url.ok_or("Base URL required (--base-url)")?;
    let catalog_path = cli.catalog.ok_or("Catalog path required (--catalog)")?;
    let catalog = commands::load_catalog(&catalog_path)?;

    match cli.command {
        Commands::Fetch {
            entity,
            limit,
            offset,
            pagination,
            format,
        } => {
            let config = commands::config_for(&base_url, &pagination)?;
            commands::fetch::run(catalog, &config, &entity, limit, offset, &format).await?;
        }
        Commands::Show { entity, id, format } => {
            let config = commands::config_for(&base_url, "none")?;
            commands::show::run(catalog, &config, &entity, &id, &format).await?;
        }
        Commands::Related {
            entity,
            id,
            relationship,
            format,
        } => {
            let config = commands::config_for(&base_url, "none")?;
            commands::related::run(catalog, &config, &entity, &id, &relationship, &format)
                .await?;
        }
        Commands::Version => {}
    }

    Ok(())
}
