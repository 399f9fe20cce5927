//! Structured provider failures.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::RetryClass;

/// What went wrong inside a provider attempt.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    Timeout,
    Network,
    RateLimited,
    /// Vendor-side 5xx.
    Unavailable,
    Unauthorized,
    NotFound,
    InvalidRequest,
    /// The vendor answered but the body could not be understood.
    Decode,
    /// The provider panicked or otherwise broke its contract.
    Fault,
    Other,
}

impl ProviderErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::RateLimited => "rate_limited",
            Self::Unavailable => "unavailable",
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not_found",
            Self::InvalidRequest => "invalid_request",
            Self::Decode => "decode",
            Self::Fault => "fault",
            Self::Other => "other",
        }
    }

    /// Whether a failure of this kind is worth retrying when the provider
    /// does not say otherwise.
    pub fn default_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Network | Self::RateLimited | Self::Unavailable
        )
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error half of a provider result.
///
/// `retryable` is the provider's own verdict from vendor signals; the retry
/// policy trusts it and never re-derives it from `kind`.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl ProviderError {
    /// Error whose retryability follows [`ProviderErrorKind::default_retryable`].
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.default_retryable(),
        }
    }

    pub fn retryable(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn permanent(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: false,
        }
    }

    /// Classify a non-success HTTP status returned by a vendor.
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = if body.is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {} - {}", status, truncate(body, 512))
        };

        let kind = match status {
            429 => ProviderErrorKind::RateLimited,
            401 | 403 => ProviderErrorKind::Unauthorized,
            404 => ProviderErrorKind::NotFound,
            408 => ProviderErrorKind::Timeout,
            500..=599 => ProviderErrorKind::Unavailable,
            400..=499 => ProviderErrorKind::InvalidRequest,
            _ => ProviderErrorKind::Other,
        };
        Self::new(kind, detail)
    }

    /// Fail-closed classification for a provider that panicked.
    pub fn fault(message: impl Into<String>) -> Self {
        Self::permanent(ProviderErrorKind::Fault, message)
    }

    pub fn retry_class(&self) -> RetryClass {
        if self.retryable {
            RetryClass::WithBackoff
        } else {
            RetryClass::NextProvider
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
