//! Database layer - statement seam, MySQL pool and stores
//!
//! - One pool per connection key, shared through `PoolRegistry`
//! - Every statement borrows its own connection and returns it before the
//!   result is observed
//! - Constraints (unique title) are enforced by the store, not checked first

pub mod memory;
pub mod mysql;
pub mod pool;
pub mod store;

pub use memory::MemoryStore;
pub use mysql::MySqlStore;
pub use pool::{create_pool, PoolRegistry};
pub use store::{Cell, Param, Row, SqlStore, Statement, StoreError};
