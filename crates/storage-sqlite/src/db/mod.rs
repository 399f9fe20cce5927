//! Connection pooling and migrations for the audit database.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use diesel::connection::{Connection, SimpleConnection};
use diesel::r2d2::{self, ConnectionManager, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{error, info};

use crate::errors::{Result, StorageError};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub const DEFAULT_DB_FILE: &str = "api_call_logs.db";

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

const CONNECTION_PRAGMAS: &str = "
    PRAGMA busy_timeout = 30000;
    PRAGMA synchronous = NORMAL;
";

/// Create the database file and its directory, and switch it to WAL mode.
pub fn init(db_path: &Path) -> Result<()> {
    if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            fs::create_dir_all(dir)?;
        }
    }

    let mut conn = SqliteConnection::establish(&db_path.to_string_lossy())?;
    conn.batch_execute(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA busy_timeout = 30000;
        PRAGMA synchronous = NORMAL;
    ",
    )?;
    Ok(())
}

pub fn create_pool(db_path: &Path) -> Result<Arc<DbPool>> {
    let manager = ConnectionManager::<SqliteConnection>::new(db_path.to_string_lossy());
    let pool = Pool::builder()
        .max_size(4)
        .min_idle(Some(1))
        .connection_timeout(Duration::from_secs(30))
        .connection_customizer(Box::new(ConnectionCustomizer))
        .build(manager)?;
    Ok(Arc::new(pool))
}

pub fn run_migrations(pool: &DbPool) -> Result<()> {
    info!("Running audit database migrations");
    let mut connection = get_connection(pool)?;

    let applied = connection.run_pending_migrations(MIGRATIONS).map_err(|e| {
        error!("Audit database migration failed: {}", e);
        StorageError::MigrationFailed(e.to_string())
    })?;

    if applied.is_empty() {
        info!("No pending migrations to apply.");
    } else {
        for version in &applied {
            info!("Applied migration {}", version);
        }
    }
    Ok(())
}

pub fn get_connection(pool: &DbPool) -> Result<DbConnection> {
    Ok(pool.get()?)
}

/// Conventional database location inside `data_dir`.
pub fn get_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DEFAULT_DB_FILE)
}

#[derive(Debug)]
struct ConnectionCustomizer;

impl r2d2::CustomizeConnection<SqliteConnection, r2d2::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), r2d2::Error> {
        conn.batch_execute(CONNECTION_PRAGMAS)
            .map_err(r2d2::Error::QueryError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_path_is_inside_data_dir() {
        let path = get_db_path(Path::new("/var/lib/courier"));
        assert_eq!(path, Path::new("/var/lib/courier/api_call_logs.db"));
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = get_db_path(&dir.path().join("nested"));

        init(&path).unwrap();
        let pool = create_pool(&path).unwrap();
        run_migrations(&pool).unwrap();
        run_migrations(&pool).unwrap();

        assert!(path.exists());
        assert!(get_connection(&pool).is_ok());
    }
}
