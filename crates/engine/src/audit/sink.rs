//! Storage seam for attempt records.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::errors::AuditError;
use crate::models::{AttemptOutcome, AttemptRecord, CallId, Capability};

/// Append-only storage for [`AttemptRecord`]s.
///
/// The call logger's writer task is the only caller of [`AuditSink::append`],
/// so writes arrive one batch at a time. `query` may run concurrently with
/// writes and must tolerate that.
pub trait AuditSink: Send + Sync + 'static {
    /// Persist a batch in order. A failure drops the whole batch.
    fn append(&self, records: &[AttemptRecord]) -> Result<(), AuditError>;

    /// Records matching `filter`, oldest first, read lazily where the
    /// backend allows it.
    fn query(&self, filter: &AttemptFilter) -> Result<AttemptIter, AuditError>;
}

/// Conjunction of optional predicates over attempt records.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttemptFilter {
    pub call_id: Option<CallId>,
    pub provider: Option<String>,
    pub capability: Option<Capability>,
    pub outcome: Option<AttemptOutcome>,
    /// Inclusive lower bound on `started_at`.
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `started_at`.
    pub until: Option<DateTime<Utc>>,
}

impl AttemptFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_id(mut self, call_id: CallId) -> Self {
        self.call_id = Some(call_id);
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn capability(mut self, capability: Capability) -> Self {
        self.capability = Some(capability);
        self
    }

    pub fn outcome(mut self, outcome: AttemptOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn matches(&self, record: &AttemptRecord) -> bool {
        self.call_id.map_or(true, |id| record.call_id == id)
            && self
                .provider
                .as_deref()
                .map_or(true, |p| record.provider == p)
            && self.capability.map_or(true, |c| record.capability == c)
            && self.outcome.map_or(true, |o| record.outcome == o)
            && self.since.map_or(true, |t| record.started_at >= t)
            && self.until.map_or(true, |t| record.started_at <= t)
    }
}

/// Lazy sequence of attempt records returned by a query.
pub struct AttemptIter {
    inner: Box<dyn Iterator<Item = AttemptRecord> + Send>,
}

impl AttemptIter {
    pub fn new<I>(inner: I) -> Self
    where
        I: Iterator<Item = AttemptRecord> + Send + 'static,
    {
        Self {
            inner: Box::new(inner),
        }
    }

    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }
}

impl Iterator for AttemptIter {
    type Item = AttemptRecord;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl fmt::Debug for AttemptIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AttemptIter")
    }
}
