/// Structured error types for wikidb-core.
///
/// Library consumers get `WikiError`; the `wikidb` binary wraps these
/// in `anyhow` at the edges.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for catalog and configuration loading
#[derive(Error, Debug)]
pub enum WikiError {
    /// I/O operation failed
    #[error("I/O error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Properties text could not be parsed
    #[error("Malformed query catalog at line {line}: {reason}")]
    CatalogParse { line: usize, reason: String },

    /// A required query key is absent from the catalog source
    #[error("Query catalog is missing required key '{key}'")]
    MissingQuery { key: &'static str },

    /// TOML config could not be parsed
    #[error("Invalid config file {path:?}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Config { reason: String },
}

/// Result type alias for wikidb-core operations
pub type Result<T> = std::result::Result<T, WikiError>;

impl WikiError {
    /// Create an I/O error bound to a path
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a catalog parse error
    pub fn catalog_parse(line: usize, reason: impl Into<String>) -> Self {
        Self::CatalogParse {
            line,
            reason: reason.into(),
        }
    }

    /// Create a config error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }
}
