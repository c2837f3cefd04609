//! wikidb-server: message-driven database service for wiki pages
//!
//! The web front talks to the database service over an in-process bus.
//! The service owns the store handle, runs catalog statements and shapes
//! their rows into protocol replies. `bootstrap` sequences startup.

pub mod bootstrap;
pub mod bus;
pub mod db;
pub mod error;
pub mod service;

pub use bootstrap::{shutdown_signal, Bootstrap, BootstrapError, Component, Deployment};
pub use bus::{BusError, EventBus, MessageHandler};
pub use error::StartupError;
pub use service::{DatabaseComponent, WikiDatabaseService};
