//! Storage engine for the retention engine
//!
//! Defines the [`MemoryStore`] seam, the SQLite backend (WAL mode, schema
//! migrations) and the per-owner lock registry.

mod backend;
mod connection;
mod locks;
mod migrations;
pub mod queries;
mod sqlite_backend;

pub use backend::MemoryStore;
pub use connection::Storage;
pub use locks::{OwnerGuard, OwnerLocks};
pub use migrations::SCHEMA_VERSION;
pub use sqlite_backend::SqliteBackend;
