//! Audit facts: one record per provider invocation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CallId, Capability};

/// Result of a single attempt.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    RetryableFailure,
    PermanentFailure,
    /// The invocation was abandoned because the call deadline elapsed.
    Cancelled,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::RetryableFailure => "retryable_failure",
            Self::PermanentFailure => "permanent_failure",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "retryable_failure" => Ok(Self::RetryableFailure),
            "permanent_failure" => Ok(Self::PermanentFailure),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown attempt outcome '{}'", other)),
        }
    }
}

/// Immutable record of one attempt, appended to the call logger exactly once.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub call_id: CallId,
    pub provider: String,
    pub capability: Capability,
    /// 1-based, restarts at 1 for every candidate.
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: AttemptOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Masked request parameters, present only when request recording is on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_parses_its_own_names() {
        for outcome in [
            AttemptOutcome::Success,
            AttemptOutcome::RetryableFailure,
            AttemptOutcome::PermanentFailure,
            AttemptOutcome::Cancelled,
        ] {
            assert_eq!(outcome.as_str().parse::<AttemptOutcome>(), Ok(outcome));
        }
        assert!("timeout".parse::<AttemptOutcome>().is_err());
    }

    #[test]
    fn test_record_line_omits_absent_error_fields() {
        let record = AttemptRecord {
            call_id: CallId::new(),
            provider: "mailgun".to_string(),
            capability: Capability::EmailSend,
            attempt: 1,
            started_at: Utc::now(),
            duration_ms: 12,
            outcome: AttemptOutcome::Success,
            error_kind: None,
            error_message: None,
            request: None,
        };

        let line = serde_json::to_string(&record).unwrap();
        assert!(line.contains("\"capability\":\"email.send\""));
        assert!(line.contains("\"outcome\":\"success\""));
        assert!(!line.contains("error_kind"));
        assert!(!line.contains("request"));
    }
}
