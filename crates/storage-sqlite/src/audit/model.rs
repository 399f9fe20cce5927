//! Database models for attempt records.

use chrono::{DateTime, SecondsFormat, Utc};
use courier_engine::{AttemptOutcome, AttemptRecord, CallId, Capability};
use diesel::prelude::*;

use crate::errors::StorageError;

/// Row as stored. Timestamps are fixed-width RFC 3339 text so that string
/// comparison orders them correctly.
#[derive(Queryable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::attempt_records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AttemptRecordDB {
    pub id: i32,
    pub call_id: String,
    pub provider: String,
    pub capability: String,
    pub attempt: i32,
    pub started_at: String,
    pub duration_ms: i64,
    pub outcome: String,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub request: Option<String>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::attempt_records)]
pub struct NewAttemptRecordDB {
    pub call_id: String,
    pub provider: String,
    pub capability: String,
    pub attempt: i32,
    pub started_at: String,
    pub duration_ms: i64,
    pub outcome: String,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub request: Option<String>,
}

pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl TryFrom<&AttemptRecord> for NewAttemptRecordDB {
    type Error = StorageError;

    fn try_from(record: &AttemptRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            call_id: record.call_id.to_string(),
            provider: record.provider.clone(),
            capability: record.capability.as_str().to_string(),
            attempt: i32::try_from(record.attempt).unwrap_or(i32::MAX),
            started_at: format_timestamp(&record.started_at),
            duration_ms: i64::try_from(record.duration_ms).unwrap_or(i64::MAX),
            outcome: record.outcome.as_str().to_string(),
            error_kind: record.error_kind.clone(),
            error_message: record.error_message.clone(),
            request: record
                .request
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        })
    }
}

impl TryFrom<AttemptRecordDB> for AttemptRecord {
    type Error = StorageError;

    fn try_from(db: AttemptRecordDB) -> Result<Self, Self::Error> {
        let invalid = |field: &str, detail: String| {
            StorageError::SerializationError(format!(
                "attempt record {}: invalid {}: {}",
                db.id, field, detail
            ))
        };

        Ok(Self {
            call_id: db
                .call_id
                .parse::<CallId>()
                .map_err(|e| invalid("call_id", e.to_string()))?,
            provider: db.provider.clone(),
            capability: db
                .capability
                .parse::<Capability>()
                .map_err(|e| invalid("capability", e.to_string()))?,
            attempt: u32::try_from(db.attempt).map_err(|e| invalid("attempt", e.to_string()))?,
            started_at: DateTime::parse_from_rfc3339(&db.started_at)
                .map_err(|e| invalid("started_at", e.to_string()))?
                .with_timezone(&Utc),
            duration_ms: u64::try_from(db.duration_ms)
                .map_err(|e| invalid("duration_ms", e.to_string()))?,
            outcome: db
                .outcome
                .parse::<AttemptOutcome>()
                .map_err(|e| invalid("outcome", e))?,
            error_kind: db.error_kind.clone(),
            error_message: db.error_message.clone(),
            request: db
                .request
                .as_deref()
                .map(serde_json::from_str::<serde_json::Value>)
                .transpose()?,
        })
    }
}
