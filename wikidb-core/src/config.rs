//! Service configuration
//!
//! Layered, lowest precedence first: built-in defaults, TOML file,
//! `WIKIDB_*` environment variables. CLI flags are applied on top by the
//! binary.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog::CatalogSource;
use crate::error::{Result, WikiError};

/// Default bus address the database service listens on
pub const DEFAULT_QUEUE: &str = "wikiDb.queue";

/// Top-level configuration for the database service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WikiDbConfig {
    /// Bus address the service registers under
    pub queue: String,
    pub mysql: MysqlConfig,
    pub sql_queries: SqlQueriesConfig,
}

/// Connection settings for the MySQL pool
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct MysqlConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub max_pool_size: u32,
    /// Seconds to wait for a pooled connection before giving up
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlQueriesConfig {
    /// Properties file overriding the bundled statements
    pub resource_file: Option<PathBuf>,
}

impl Default for WikiDbConfig {
    fn default() -> Self {
        Self {
            queue: DEFAULT_QUEUE.to_string(),
            mysql: MysqlConfig::default(),
            sql_queries: SqlQueriesConfig::default(),
        }
    }
}

impl Default for MysqlConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            username: "root".to_string(),
            password: String::new(),
            database: "testDb".to_string(),
            max_pool_size: 10,
            connect_timeout_secs: 10,
        }
    }
}

impl WikiDbConfig {
    /// Default config file path: ~/.wikidb/config.toml
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".wikidb/config.toml")
    }

    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, `~/.wikidb/config.toml`
    /// is read when present and defaults are used otherwise. Environment
    /// overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Self::config_path();
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| WikiError::io(path, e))?;
        Self::from_toml(&content).map_err(|source| WikiError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse TOML text; missing fields keep their defaults
    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Apply `WIKIDB_*` overrides using `lookup` to read variables.
    ///
    /// Takes a lookup function so tests do not touch process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("WIKIDB_MYSQL_HOST") {
            self.mysql.host = host;
        }
        if let Some(port) = lookup("WIKIDB_MYSQL_PORT") {
            self.mysql.port = parse_number("WIKIDB_MYSQL_PORT", &port)?;
        }
        if let Some(username) = lookup("WIKIDB_MYSQL_USERNAME") {
            self.mysql.username = username;
        }
        if let Some(password) = lookup("WIKIDB_MYSQL_PASSWORD") {
            self.mysql.password = password;
        }
        if let Some(database) = lookup("WIKIDB_MYSQL_DATABASE") {
            self.mysql.database = database;
        }
        if let Some(size) = lookup("WIKIDB_MYSQL_MAX_POOL_SIZE") {
            self.mysql.max_pool_size = parse_number("WIKIDB_MYSQL_MAX_POOL_SIZE", &size)?;
        }
        if let Some(secs) = lookup("WIKIDB_MYSQL_CONNECT_TIMEOUT_SECS") {
            self.mysql.connect_timeout_secs =
                parse_number("WIKIDB_MYSQL_CONNECT_TIMEOUT_SECS", &secs)?;
        }
        if let Some(file) = lookup("WIKIDB_SQL_QUERIES_FILE") {
            self.sql_queries.resource_file = Some(PathBuf::from(file));
        }
        if let Some(queue) = lookup("WIKIDB_QUEUE") {
            self.queue = queue;
        }
        Ok(())
    }

    /// Where the query catalog should be loaded from
    pub fn catalog_source(&self) -> CatalogSource {
        CatalogSource::from_option(self.sql_queries.resource_file.clone())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| WikiError::config(format!("{key} must be a number, got '{raw}'")))
}
