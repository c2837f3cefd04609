//! Command implementations for the wikidb CLI

pub mod queries;
pub mod serve;

pub use queries::run_queries;
pub use serve::run_serve;
