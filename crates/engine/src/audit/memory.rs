//! In-process sink, for tests and short-lived tools.

use std::sync::{Mutex, MutexGuard};

use log::warn;

use super::{AttemptFilter, AttemptIter, AuditSink};
use crate::errors::AuditError;
use crate::models::AttemptRecord;

#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<AttemptRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<AttemptRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| {
            warn!("Memory sink lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of everything stored so far.
    pub fn records(&self) -> Vec<AttemptRecord> {
        self.lock().clone()
    }
}

impl AuditSink for MemorySink {
    fn append(&self, records: &[AttemptRecord]) -> Result<(), AuditError> {
        self.lock().extend_from_slice(records);
        Ok(())
    }

    /// Matches are copied out up front; the lock is not held while iterating.
    fn query(&self, filter: &AttemptFilter) -> Result<AttemptIter, AuditError> {
        let matching: Vec<AttemptRecord> = self
            .lock()
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        Ok(AttemptIter::new(matching.into_iter()))
    }
}
