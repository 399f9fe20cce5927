//! Storage-specific error types for the SQLite audit sink.
//!
//! Diesel and r2d2 errors stay inside this crate; callers of the
//! [`AuditSink`](courier_engine::AuditSink) trait only ever see
//! [`AuditError`].

use courier_engine::AuditError;
use diesel::result::Error as DieselError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[from] diesel::ConnectionError),

    #[error("Connection pool error: {0}")]
    PoolError(#[from] r2d2::Error),

    #[error("Query execution failed: {0}")]
    QueryFailed(#[from] DieselError),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

impl From<StorageError> for AuditError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Io(e) => AuditError::Io(e),
            other => AuditError::Storage(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_surface_as_audit_errors() {
        let err: AuditError = StorageError::QueryFailed(DieselError::NotFound).into();
        assert!(matches!(err, AuditError::Storage(msg) if msg.contains("Record not found")));

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: AuditError = StorageError::Io(io).into();
        assert!(matches!(err, AuditError::Io(_)));
    }
}
