//! Error types for wikidb-server

use thiserror::Error;
use wikidb_core::WikiError;

use crate::bus::BusError;
use crate::db::StoreError;

/// Why the database service failed to start. Every variant is fatal.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("could not load query catalog: {0}")]
    Catalog(#[from] WikiError),

    #[error("could not open a database connection: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("database preparation error: {0}")]
    Prepare(#[source] StoreError),

    #[error("could not register consumer: {0}")]
    Register(#[from] BusError),
}
