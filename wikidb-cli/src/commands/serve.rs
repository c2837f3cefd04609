//! Serve command: run the database service with a stdio front
//!
//! Settings resolve as defaults, then the TOML file, then `WIKIDB_*`
//! environment variables, then the flags below.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use wikidb_core::WikiDbConfig;
use wikidb_server::db::{MemoryStore, PoolRegistry};
use wikidb_server::{shutdown_signal, Bootstrap, DatabaseComponent, EventBus};

use crate::front::LineFront;

/// Arguments for the serve command
#[derive(Parser, Debug, Default)]
pub struct ServeArgs {
    /// Config file (default: ~/.wikidb/config.toml when present)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// MySQL host
    #[arg(long)]
    pub host: Option<String>,

    /// MySQL port
    #[arg(long)]
    pub port: Option<u16>,

    /// MySQL user
    #[arg(long)]
    pub username: Option<String>,

    /// MySQL password
    #[arg(long)]
    pub password: Option<String>,

    /// MySQL database name
    #[arg(long)]
    pub database: Option<String>,

    /// Maximum pooled connections
    #[arg(long)]
    pub max_pool_size: Option<u32>,

    /// Seconds to wait for a MySQL connection
    #[arg(long)]
    pub connect_timeout: Option<u64>,

    /// Properties file replacing the bundled SQL statements
    #[arg(long)]
    pub queries: Option<PathBuf>,

    /// Bus address the database service listens on
    #[arg(long)]
    pub queue: Option<String>,

    /// Use an in-process page table instead of MySQL
    #[arg(long)]
    pub in_memory: bool,
}

impl ServeArgs {
    /// Apply flag overrides on top of a loaded config
    fn apply(&self, config: &mut WikiDbConfig) {
        if let Some(host) = &self.host {
            config.mysql.host = host.clone();
        }
        if let Some(port) = self.port {
            config.mysql.port = port;
        }
        if let Some(username) = &self.username {
            config.mysql.username = username.clone();
        }
        if let Some(password) = &self.password {
            config.mysql.password = password.clone();
        }
        if let Some(database) = &self.database {
            config.mysql.database = database.clone();
        }
        if let Some(size) = self.max_pool_size {
            config.mysql.max_pool_size = size;
        }
        if let Some(secs) = self.connect_timeout {
            config.mysql.connect_timeout_secs = secs;
        }
        if let Some(queries) = &self.queries {
            config.sql_queries.resource_file = Some(queries.clone());
        }
        if let Some(queue) = &self.queue {
            config.queue = queue.clone();
        }
    }
}

/// Run until stdin closes or a shutdown signal arrives
pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let mut config =
        WikiDbConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);

    let pools = PoolRegistry::new();
    let queue = config.queue.clone();
    let database = if args.in_memory {
        tracing::info!("Using in-memory page store");
        DatabaseComponent::with_store(config, Arc::new(MemoryStore::new()))
    } else {
        DatabaseComponent::mysql(config, pools.clone())
    };

    let bootstrap = Bootstrap::new(EventBus::new());
    let front = LineFront::stdio(&queue);
    bootstrap
        .run(&database, &[&front])
        .await
        .context("Startup failed")?;

    tracing::info!(queue = %queue, "Ready; reading envelopes from stdin");

    let outcome = tokio::select! {
        handled = front.finished() => handled.map(Some),
        _ = shutdown_signal() => Ok(None),
    };

    pools.close_all().await;

    match outcome.context("stdio front failed")? {
        Some(handled) => tracing::info!(handled, "Input closed, shutting down"),
        None => tracing::info!("Shutdown requested"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let args = ServeArgs {
            host: Some("db.internal".into()),
            port: Some(3307),
            connect_timeout: Some(2),
            password: Some("secret".into()),
            queries: Some(PathBuf::from("/tmp/q.properties")),
            queue: Some("pages".into()),
            ..Default::default()
        };
        let mut config = WikiDbConfig::default();

        args.apply(&mut config);

        assert_eq!(config.mysql.host, "db.internal");
        assert_eq!(config.mysql.port, 3307);
        assert_eq!(config.mysql.connect_timeout_secs, 2);
        assert_eq!(config.mysql.password, "secret");
        assert_eq!(config.mysql.username, "root");
        assert_eq!(config.queue, "pages");
        assert_eq!(
            config.sql_queries.resource_file,
            Some(PathBuf::from("/tmp/q.properties"))
        );
    }

    #[test]
    fn no_flags_keep_config() {
        let mut config = WikiDbConfig::default();
        ServeArgs::default().apply(&mut config);
        assert_eq!(config, WikiDbConfig::default());
    }
}
