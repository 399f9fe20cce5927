//! Exponential backoff with jitter, as a pure decision function.
//!
//! Per candidate the executor walks
//! `Pending -> InFlight -> {Success | RetryScheduled -> Pending | GiveUp}`.
//! [`RetryPolicy::decide`] computes the transition out of `InFlight`; it reads
//! nothing but its arguments, so every schedule can be reproduced with a
//! seeded RNG.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::{ConfigurationError, ProviderError, ProviderErrorKind, RetryClass};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 200;
const DEFAULT_MULTIPLIER: f64 = 2.0;
const DEFAULT_MAX_DELAY_MS: u64 = 5_000;
const DEFAULT_JITTER_FRACTION: f64 = 0.2;

/// Retry parameters for one candidate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryConfig {
    /// Attempts per candidate, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    /// Cap applied before jitter.
    pub max_delay_ms: u64,
    /// Jitter spread as a fraction of the delay, in `[0, 1]`.
    pub jitter_fraction: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            multiplier: DEFAULT_MULTIPLIER,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_fraction: DEFAULT_JITTER_FRACTION,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_attempts == 0 {
            return Err(ConfigurationError::InvalidRetryConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigurationError::InvalidRetryConfig(format!(
                "multiplier must be >= 1.0 (got {})",
                self.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            return Err(ConfigurationError::InvalidRetryConfig(format!(
                "jitter_fraction must be within [0, 1] (got {})",
                self.jitter_fraction
            )));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(ConfigurationError::InvalidRetryConfig(format!(
                "base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}

/// Partial retry settings layered over a [`RetryConfig`].
///
/// Used both on provider records and per call. Unset fields fall through to
/// the layer below.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitter_fraction: Option<f64>,
}

impl RetryOverrides {
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = Some(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = Some(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn jitter_fraction(mut self, fraction: f64) -> Self {
        self.jitter_fraction = Some(fraction);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, base: &RetryConfig) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts.unwrap_or(base.max_attempts),
            base_delay_ms: self.base_delay_ms.unwrap_or(base.base_delay_ms),
            multiplier: self.multiplier.unwrap_or(base.multiplier),
            max_delay_ms: self.max_delay_ms.unwrap_or(base.max_delay_ms),
            jitter_fraction: self.jitter_fraction.unwrap_or(base.jitter_fraction),
        }
    }
}

/// Where one candidate is in its attempt cycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryPhase {
    Pending,
    InFlight,
    Success,
    RetryScheduled,
    GiveUp,
}

/// Retry bookkeeping for one (call, candidate) pair.
///
/// Created when a candidate starts receiving attempts and dropped when it is
/// abandoned, so nothing carries over between candidates or calls.
#[derive(Clone, Debug)]
pub struct RetryState {
    attempt: u32,
    phase: RetryPhase,
    last_error: Option<ProviderErrorKind>,
    next_delay: Option<Duration>,
}

impl RetryState {
    pub fn new() -> Self {
        Self {
            attempt: 0,
            phase: RetryPhase::Pending,
            last_error: None,
            next_delay: None,
        }
    }

    /// Number of the attempt in flight, or of the last one made.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn phase(&self) -> RetryPhase {
        self.phase
    }

    pub fn last_error(&self) -> Option<ProviderErrorKind> {
        self.last_error
    }

    pub fn next_delay(&self) -> Option<Duration> {
        self.next_delay
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, RetryPhase::Success | RetryPhase::GiveUp)
    }

    /// Move to `InFlight` and return the new attempt number (1-based).
    pub fn start_attempt(&mut self) -> u32 {
        debug_assert!(!self.is_terminal(), "attempt started on a finished candidate");
        self.attempt += 1;
        self.phase = RetryPhase::InFlight;
        self.next_delay = None;
        self.attempt
    }

    /// Record the policy's verdict on the attempt in flight.
    pub fn finish_attempt(&mut self, decision: &RetryDecision, error: Option<&ProviderError>) {
        self.last_error = error.map(|e| e.kind);
        match decision {
            RetryDecision::Success => self.phase = RetryPhase::Success,
            RetryDecision::Retry { delay } => {
                self.phase = RetryPhase::RetryScheduled;
                self.next_delay = Some(*delay);
            }
            RetryDecision::GiveUp(_) => self.phase = RetryPhase::GiveUp,
        }
    }

    /// The scheduled delay has elapsed.
    pub fn resume(&mut self) {
        if self.phase == RetryPhase::RetryScheduled {
            self.phase = RetryPhase::Pending;
        }
    }
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a candidate was abandoned.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GiveUpReason {
    /// The provider said retrying cannot help.
    Permanent,
    /// Retryable failures used up `max_attempts`.
    Exhausted,
}

/// Transition out of `InFlight`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RetryDecision {
    Success,
    Retry { delay: Duration },
    GiveUp(GiveUpReason),
}

/// A validated [`RetryConfig`] plus the schedule maths.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Pre-jitter delay after failed attempt number `attempt` (1-based):
    /// `min(max_delay, base_delay * multiplier^(attempt - 1))`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.config.base_delay_ms as f64 * self.config.multiplier.powi(exponent);
        // A zero base times an overflowed factor is NaN: no delay.
        let capped = if raw.is_nan() {
            0.0
        } else {
            raw.min(self.config.max_delay_ms as f64)
        };
        Duration::from_millis(capped.max(0.0).round() as u64)
    }

    /// Add uniform jitter in `[-f * delay, +f * delay]`, clamped at zero.
    pub fn jittered<R: Rng + ?Sized>(&self, delay: Duration, rng: &mut R) -> Duration {
        let spread = delay.as_secs_f64() * self.config.jitter_fraction;
        if spread <= 0.0 {
            return delay;
        }
        let offset = rng.gen_range(-spread..=spread);
        Duration::from_secs_f64((delay.as_secs_f64() + offset).max(0.0))
    }

    /// Decide what follows the attempt recorded in `state`.
    ///
    /// Permanent errors give up at once without using the remaining budget.
    pub fn decide<T, R: Rng + ?Sized>(
        &self,
        state: &RetryState,
        result: &Result<T, ProviderError>,
        rng: &mut R,
    ) -> RetryDecision {
        let error = match result {
            Ok(_) => return RetryDecision::Success,
            Err(error) => error,
        };

        match error.retry_class() {
            RetryClass::NextProvider => RetryDecision::GiveUp(GiveUpReason::Permanent),
            RetryClass::WithBackoff if state.attempt() >= self.config.max_attempts => {
                RetryDecision::GiveUp(GiveUpReason::Exhausted)
            }
            RetryClass::WithBackoff => RetryDecision::Retry {
                delay: self.jittered(self.backoff(state.attempt()), rng),
            },
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            config: RetryConfig::default(),
        }
    }
}
