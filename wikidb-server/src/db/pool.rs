//! MySQL connection pool management
//!
//! Pools are shared per connection key (host, port, credentials, database,
//! pool size) through a [`PoolRegistry`], so components configured alike
//! reuse one pool.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::MySqlPool;
use tokio::sync::Mutex;
use wikidb_core::MysqlConfig;

/// Connection options for `config`
pub fn connect_options(config: &MysqlConfig) -> MySqlConnectOptions {
    MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.username)
        .password(&config.password)
        .database(&config.database)
}

/// Create a MySQL connection pool.
///
/// Opens one connection up front so an unreachable server fails here
/// rather than on the first request. Gives up after
/// `connect_timeout_secs`.
///
/// # Errors
///
/// Returns an error if the connection fails.
pub async fn create_pool(config: &MysqlConfig) -> Result<MySqlPool, sqlx::Error> {
    MySqlPoolOptions::new()
        .max_connections(config.max_pool_size)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect_with(connect_options(config))
        .await
}

/// Process-local set of shared pools keyed by connection settings
#[derive(Clone, Default)]
pub struct PoolRegistry {
    pools: Arc<Mutex<HashMap<MysqlConfig, MySqlPool>>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the pool for `config`, connecting it on first use.
    pub async fn get_or_connect(&self, config: &MysqlConfig) -> Result<MySqlPool, sqlx::Error> {
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(config) {
            return Ok(pool.clone());
        }

        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            max_pool_size = config.max_pool_size,
            "Opening MySQL pool"
        );
        let pool = create_pool(config).await?;
        pools.insert(config.clone(), pool.clone());
        Ok(pool)
    }

    /// Close every pool and forget it
    pub async fn close_all(&self) {
        let pools: Vec<MySqlPool> = self.pools.lock().await.drain().map(|(_, p)| p).collect();
        for pool in pools {
            pool.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Integration tests require a real database
    // Run with: WIKIDB_MYSQL_HOST=... cargo test -p wikidb-server -- --ignored

    fn test_config() -> MysqlConfig {
        let mut config = MysqlConfig::default();
        if let Ok(host) = std::env::var("WIKIDB_MYSQL_HOST") {
            config.host = host;
        }
        if let Ok(password) = std::env::var("WIKIDB_MYSQL_PASSWORD") {
            config.password = password;
        }
        config
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn pool_acquires_connection() {
        let pool = create_pool(&test_config()).await.expect("pool creation failed");

        let result: (i64,) = sqlx::query_as("SELECT 1")
            .fetch_one(&pool)
            .await
            .expect("query failed");

        assert_eq!(result.0, 1);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn registry_shares_pool_per_key() {
        let registry = PoolRegistry::new();
        let config = test_config();

        let first = registry.get_or_connect(&config).await.expect("connect failed");
        let second = registry.get_or_connect(&config).await.expect("connect failed");

        // Same underlying pool: a connection held by one is counted by the other
        let _held = first.acquire().await.expect("acquire failed");
        assert_eq!(second.size(), first.size());

        registry.close_all().await;
        assert!(first.is_closed());
    }
}
