//! Engine configuration.
//!
//! Plain serde structs with defaults for every field. The engine never reads
//! files or the environment; callers deserialize these from whatever source
//! they use and pass them in.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigurationError;
use crate::retry::RetryConfig;

const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggerConfig {
    /// Bound on records waiting for the writer task.
    pub queue_capacity: usize,
    /// Store masked request parameters with each attempt record.
    pub record_request_params: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            record_request_params: false,
        }
    }
}

impl LoggerConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.queue_capacity == 0 {
            return Err(ConfigurationError::Invalid(
                "queue_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings for the executor. Audit settings live in [`LoggerConfig`] and
/// travel with the [`CallLogger`](crate::CallLogger) handed to the engine.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct EngineConfig {
    /// Retry settings every provider starts from.
    pub retry: RetryConfig,
    /// Budget for a whole call when the caller sets none. Unbounded if absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_deadline_ms: Option<u64>,
}

impl EngineConfig {
    pub fn default_deadline(&self) -> Option<Duration> {
        self.default_deadline_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.retry.validate()?;
        if self.default_deadline_ms == Some(0) {
            return Err(ConfigurationError::Invalid(
                "default_deadline_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.default_deadline().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_nested_overrides() {
        let config: EngineConfig = serde_json::from_str(
            r#"{
                "retry": { "maxAttempts": 4, "jitterFraction": 0.0 },
                "defaultDeadlineMs": 2500
            }"#,
        )
        .unwrap();

        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.base_delay_ms, 200);
        assert_eq!(config.default_deadline(), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_logger_settings_are_not_engine_settings() {
        let result = serde_json::from_str::<EngineConfig>(
            r#"{ "logger": { "recordRequestParams": true } }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_logger_config_document() {
        let config: LoggerConfig =
            serde_json::from_str(r#"{ "recordRequestParams": true }"#).unwrap();
        assert!(config.record_request_params);
        assert_eq!(config.queue_capacity, 1024);
        assert!(config.validate().is_ok());

        let empty = LoggerConfig {
            queue_capacity: 0,
            ..LoggerConfig::default()
        };
        assert!(matches!(empty.validate(), Err(ConfigurationError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = EngineConfig {
            default_deadline_ms: Some(0),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigurationError::Invalid(_))));

        let mut config = EngineConfig::default();
        config.retry.max_attempts = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidRetryConfig(_))
        ));
    }
}
