use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use courier_engine::{AttemptFilter, AttemptIter, AttemptRecord, AuditError, AuditSink};
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use log::{debug, error, warn};

use super::model::{format_timestamp, AttemptRecordDB, NewAttemptRecordDB};
use crate::db::{self, get_connection, DbPool};
use crate::errors::{Result, StorageError};
use crate::schema::attempt_records;

/// Rows fetched per round trip while iterating a query.
const PAGE_SIZE: i64 = 500;

/// [`AuditSink`] backed by a SQLite table.
///
/// Appends run in one immediate transaction per batch, so a failed batch
/// leaves nothing behind. Queries page through the table by row id, which
/// keeps memory flat for large result sets.
pub struct SqliteAuditSink {
    pool: Arc<DbPool>,
}

impl SqliteAuditSink {
    /// Wrap an existing pool. Migrations must already have run.
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    /// Create the database at `path` if needed, migrate it and open a pool.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        db::init(path)?;
        let pool = db::create_pool(path)?;
        db::run_migrations(&pool)?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &Arc<DbPool> {
        &self.pool
    }
}

impl AuditSink for SqliteAuditSink {
    fn append(&self, records: &[AttemptRecord]) -> std::result::Result<(), AuditError> {
        if records.is_empty() {
            return Ok(());
        }

        let rows = records
            .iter()
            .map(NewAttemptRecordDB::try_from)
            .collect::<Result<Vec<_>>>()?;

        let mut conn = get_connection(&self.pool)?;
        conn.immediate_transaction::<_, DieselError, _>(|conn| {
            diesel::insert_into(attempt_records::table)
                .values(&rows)
                .execute(conn)
        })
        .map_err(StorageError::from)?;

        debug!("Stored {} attempt record(s)", rows.len());
        Ok(())
    }

    fn query(&self, filter: &AttemptFilter) -> std::result::Result<AttemptIter, AuditError> {
        // The first page is read eagerly so connection errors surface here.
        let first = load_page(&self.pool, filter, 0)?;
        let mut pages = Pages {
            pool: Arc::clone(&self.pool),
            filter: filter.clone(),
            buffer: VecDeque::new(),
            last_id: 0,
            exhausted: false,
        };
        pages.fill(first);
        Ok(AttemptIter::new(pages))
    }
}

fn load_page(pool: &DbPool, filter: &AttemptFilter, after: i32) -> Result<Vec<AttemptRecordDB>> {
    let mut conn = get_connection(pool)?;

    let mut query = attempt_records::table
        .filter(attempt_records::id.gt(after))
        .into_boxed();

    if let Some(call_id) = filter.call_id {
        query = query.filter(attempt_records::call_id.eq(call_id.to_string()));
    }
    if let Some(provider) = &filter.provider {
        query = query.filter(attempt_records::provider.eq(provider.clone()));
    }
    if let Some(capability) = filter.capability {
        query = query.filter(attempt_records::capability.eq(capability.as_str().to_string()));
    }
    if let Some(outcome) = filter.outcome {
        query = query.filter(attempt_records::outcome.eq(outcome.as_str().to_string()));
    }
    if let Some(since) = &filter.since {
        query = query.filter(attempt_records::started_at.ge(format_timestamp(since)));
    }
    if let Some(until) = &filter.until {
        query = query.filter(attempt_records::started_at.le(format_timestamp(until)));
    }

    let rows = query
        .order(attempt_records::id.asc())
        .limit(PAGE_SIZE)
        .load::<AttemptRecordDB>(&mut conn)?;
    Ok(rows)
}

/// Lazy cursor over a filtered query, one page at a time.
struct Pages {
    pool: Arc<DbPool>,
    filter: AttemptFilter,
    buffer: VecDeque<AttemptRecordDB>,
    last_id: i32,
    exhausted: bool,
}

impl Pages {
    fn fill(&mut self, rows: Vec<AttemptRecordDB>) {
        self.exhausted = (rows.len() as i64) < PAGE_SIZE;
        if let Some(last) = rows.last() {
            self.last_id = last.id;
        }
        self.buffer.extend(rows);
    }
}

impl Iterator for Pages {
    type Item = AttemptRecord;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.buffer.pop_front() {
                match AttemptRecord::try_from(row) {
                    Ok(record) => return Some(record),
                    Err(e) => {
                        warn!("Skipping unreadable attempt record: {}", e);
                        continue;
                    }
                }
            }

            if self.exhausted {
                return None;
            }

            match load_page(&self.pool, &self.filter, self.last_id) {
                Ok(rows) => self.fill(rows),
                Err(e) => {
                    error!("Failed to read attempt records: {}", e);
                    self.exhausted = true;
                    return None;
                }
            }
        }
    }
}
