//! Print the SQL catalog as `key=statement` lines

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use wikidb_core::{QueryCatalog, WikiDbConfig};

#[derive(Parser, Debug)]
pub struct QueriesArgs {
    /// Config file (default: ~/.wikidb/config.toml when present)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Properties file to validate instead of the configured one
    #[arg(long)]
    pub queries: Option<PathBuf>,
}

pub fn run_queries(args: QueriesArgs) -> Result<()> {
    let mut config =
        WikiDbConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(queries) = args.queries {
        config.sql_queries.resource_file = Some(queries);
    }

    let source = config.catalog_source();
    let catalog =
        QueryCatalog::load(&source).with_context(|| format!("Failed to load catalog from {source}"))?;

    for (name, sql) in catalog.iter() {
        println!("{name}={sql}");
    }
    Ok(())
}
