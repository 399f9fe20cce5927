//! Aggregates over attempt records.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::models::AttemptRecord;

/// Attempt counts and timings over a set of records.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditStats {
    pub total: u64,
    pub successes: u64,
    /// Everything that was not a success, cancelled attempts included.
    pub failures: u64,
    /// `successes / total`, or 0 with no records.
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    /// Distinct provider names, sorted.
    pub providers: Vec<String>,
}

impl AuditStats {
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = AttemptRecord>,
    {
        let mut total = 0u64;
        let mut successes = 0u64;
        let mut duration_sum = 0u128;
        let mut providers = BTreeSet::new();

        for record in records {
            total += 1;
            if record.outcome.is_success() {
                successes += 1;
            }
            duration_sum += u128::from(record.duration_ms);
            providers.insert(record.provider);
        }

        if total == 0 {
            return Self::default();
        }

        Self {
            total,
            successes,
            failures: total - successes,
            success_rate: successes as f64 / total as f64,
            avg_duration_ms: duration_sum as f64 / total as f64,
            providers: providers.into_iter().collect(),
        }
    }

    /// One entry per provider, keyed by provider name.
    pub fn by_provider<I>(records: I) -> BTreeMap<String, AuditStats>
    where
        I: IntoIterator<Item = AttemptRecord>,
    {
        let mut grouped: BTreeMap<String, Vec<AttemptRecord>> = BTreeMap::new();
        for record in records {
            grouped.entry(record.provider.clone()).or_default().push(record);
        }
        grouped
            .into_iter()
            .map(|(provider, records)| (provider, Self::from_records(records)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttemptOutcome, CallId, Capability};
    use chrono::Utc;

    fn record(provider: &str, outcome: AttemptOutcome, duration_ms: u64) -> AttemptRecord {
        AttemptRecord {
            call_id: CallId::new(),
            provider: provider.to_string(),
            capability: Capability::EmailSend,
            attempt: 1,
            started_at: Utc::now(),
            duration_ms,
            outcome,
            error_kind: None,
            error_message: None,
            request: None,
        }
    }

    #[test]
    fn test_empty_stats_are_zero() {
        let stats = AuditStats::from_records(Vec::new());
        assert_eq!(stats.total, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert!(stats.providers.is_empty());
    }

    #[test]
    fn test_rates_and_averages() {
        let stats = AuditStats::from_records(vec![
            record("sendgrid", AttemptOutcome::Success, 100),
            record("sendgrid", AttemptOutcome::RetryableFailure, 300),
            record("mailgun", AttemptOutcome::Success, 200),
            record("mailgun", AttemptOutcome::Cancelled, 400),
        ]);

        assert_eq!(stats.total, 4);
        assert_eq!(stats.successes, 2);
        assert_eq!(stats.failures, 2);
        assert_eq!(stats.success_rate, 0.5);
        assert_eq!(stats.avg_duration_ms, 250.0);
        assert_eq!(stats.providers, vec!["mailgun", "sendgrid"]);
    }

    #[test]
    fn test_grouped_by_provider() {
        let grouped = AuditStats::by_provider(vec![
            record("sendgrid", AttemptOutcome::Success, 100),
            record("sendgrid", AttemptOutcome::PermanentFailure, 100),
            record("mailgun", AttemptOutcome::Success, 50),
        ]);

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["sendgrid"].success_rate, 0.5);
        assert_eq!(grouped["mailgun"].total, 1);
    }
}
