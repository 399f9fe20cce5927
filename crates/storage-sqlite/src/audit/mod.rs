//! Persistent attempt log in SQLite.

mod model;
mod sink;

pub use model::{AttemptRecordDB, NewAttemptRecordDB};
pub use sink::SqliteAuditSink;
