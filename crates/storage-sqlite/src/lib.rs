//! SQLite storage for the courier call log.
//!
//! Implements [`courier_engine::AuditSink`] on top of Diesel with SQLite, so
//! the engine's call logger can persist attempt records somewhere queryable.
//! This crate is the only place Diesel appears; the engine itself stays
//! storage-agnostic.
//!
//! ```text
//! courier-engine (CallLogger)
//!          │  AuditSink
//!          ▼
//! storage-sqlite (this crate)
//!          │
//!          ▼
//!      SQLite DB
//! ```

pub mod audit;
pub mod db;
pub mod errors;
pub mod schema;

pub use audit::SqliteAuditSink;
pub use db::{create_pool, get_connection, get_db_path, init, run_migrations, DbConnection, DbPool};
pub use errors::StorageError;
