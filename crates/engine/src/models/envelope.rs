//! Request and response envelopes shared by every capability.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::Capability;
use crate::errors::{ProviderError, ProviderErrorKind};

/// Named request parameters.
pub type Params = serde_json::Map<String, Value>;

/// Opaque identifier of one logical call, generated by the engine facade.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(Uuid);

impl CallId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for CallId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for CallId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A capability-tagged set of named parameters.
///
/// Every attempt of one logical call sees the same envelope; the executor
/// shares it behind an `Arc` and nothing hands out mutable access.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    capability: Capability,
    params: Params,
}

impl RequestEnvelope {
    pub fn new(capability: Capability, params: Params) -> Self {
        Self { capability, params }
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// String parameter, treating `null` and empty strings as absent.
    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// String parameter that the provider cannot work without.
    ///
    /// A missing value is a permanent `InvalidRequest`: retrying the same
    /// envelope can never succeed.
    pub fn require_str(&self, key: &str) -> Result<&str, ProviderError> {
        self.str_param(key).ok_or_else(|| {
            ProviderError::permanent(
                ProviderErrorKind::InvalidRequest,
                format!("missing required parameter '{}' for {}", key, self.capability),
            )
        })
    }

    /// List of strings; a single string is accepted as a one-element list.
    pub fn str_list(&self, key: &str) -> Vec<String> {
        match self.params.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    pub fn bool_param(&self, key: &str) -> Option<bool> {
        self.params.get(key).and_then(Value::as_bool)
    }

    pub fn u64_param(&self, key: &str) -> Option<u64> {
        self.params.get(key).and_then(Value::as_u64)
    }
}

/// Why a logical call ended without a successful provider.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallFailureKind {
    /// Every candidate gave up.
    AllProvidersExhausted,
    /// The caller's deadline elapsed mid-call.
    DeadlineExceeded,
}

impl CallFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllProvidersExhausted => "all_providers_exhausted",
            Self::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

impl fmt::Display for CallFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The last error a candidate produced before it was abandoned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateFailure {
    pub provider: String,
    pub attempts: u32,
    pub kind: ProviderErrorKind,
    pub message: String,
}

/// Outcome of one logical call. Exactly one is produced per call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResponseEnvelope {
    Success {
        call_id: CallId,
        provider: String,
        payload: Value,
        /// Attempts taken across all candidates, including the successful one.
        attempts: u32,
    },
    Failure {
        call_id: CallId,
        kind: CallFailureKind,
        message: String,
        exhausted: bool,
        attempts: u32,
        failures: Vec<CandidateFailure>,
    },
}

impl ResponseEnvelope {
    pub fn call_id(&self) -> CallId {
        match self {
            Self::Success { call_id, .. } | Self::Failure { call_id, .. } => *call_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Success { attempts, .. } | Self::Failure { attempts, .. } => *attempts,
        }
    }

    /// Name of the provider that served the call, if any did.
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::Success { provider, .. } => Some(provider),
            Self::Failure { .. } => None,
        }
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Success { payload, .. } => Some(payload),
            Self::Failure { .. } => None,
        }
    }

    pub fn failure_kind(&self) -> Option<CallFailureKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { kind, .. } => Some(*kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(params: Value) -> RequestEnvelope {
        let Value::Object(map) = params else {
            panic!("params must be an object");
        };
        RequestEnvelope::new(Capability::EmailSend, map)
    }

    #[test]
    fn test_require_str_reports_missing_key_as_permanent() {
        let request = envelope(json!({"subject": "hi", "to": ""}));
        let err = request.require_str("to").unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::InvalidRequest);
        assert!(!err.retryable);
        assert!(err.message.contains("'to'"));
    }

    #[test]
    fn test_str_list_accepts_single_string() {
        let request = envelope(json!({"cc": "a@example.com", "bcc": ["b@example.com", 3]}));
        assert_eq!(request.str_list("cc"), vec!["a@example.com"]);
        assert_eq!(request.str_list("bcc"), vec!["b@example.com"]);
        assert!(request.str_list("missing").is_empty());
    }

    #[test]
    fn test_response_serializes_with_status_tag() {
        let call_id = CallId::new();
        let response = ResponseEnvelope::Failure {
            call_id,
            kind: CallFailureKind::DeadlineExceeded,
            message: "deadline of 10ms elapsed".to_string(),
            exhausted: false,
            attempts: 1,
            failures: Vec::new(),
        };

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "failure");
        assert_eq!(value["kind"], "deadline_exceeded");
        assert_eq!(value["call_id"], call_id.to_string());
    }

    #[test]
    fn test_success_accessors() {
        let response = ResponseEnvelope::Success {
            call_id: CallId::new(),
            provider: "sendgrid".to_string(),
            payload: json!({"message_id": "m-1"}),
            attempts: 2,
        };
        assert!(response.is_success());
        assert_eq!(response.provider(), Some("sendgrid"));
        assert_eq!(response.attempts(), 2);
        assert_eq!(response.failure_kind(), None);
    }
}
