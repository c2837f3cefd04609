//! wikidb-core: shared types for the wiki page store
//!
//! Holds the query catalog, service configuration and the message
//! protocol exchanged between the web front and the database service.

pub mod catalog;
pub mod config;
pub mod error;
pub mod page;
pub mod protocol;

pub use catalog::{CatalogSource, QueryCatalog, QueryName};
pub use config::{MysqlConfig, WikiDbConfig, DEFAULT_QUEUE};
pub use error::{Result, WikiError};
pub use page::Page;
pub use protocol::{Action, Envelope, ErrorCode, Failure, PageLookup, Reply, Request};
