//! Per-provider circuit breaker.
//!
//! Tracks consecutive give-ups per registered provider, keyed by capability
//! and name, so that a provider that is clearly down can be left out of new
//! candidate lists for a while:
//!
//! - **Closed**: the provider is offered normally.
//! - **Open**: the provider is left out until `recovery_timeout` passes.
//! - **HalfOpen**: at most `half_open_successes` calls are admitted per
//!   recovery window; enough successes close the circuit, any failure
//!   reopens it.
//!
//! State lives in memory only.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::models::Capability;

const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
const DEFAULT_RECOVERY_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_HALF_OPEN_SUCCESSES: u32 = 2;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        })
    }
}

/// Thresholds for opening and closing circuits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CircuitBreakerConfig {
    /// Consecutive give-ups before a circuit opens.
    pub failure_threshold: u32,
    /// How long an open circuit stays open, in milliseconds.
    pub recovery_timeout_ms: u64,
    /// Successes needed in HalfOpen before the circuit closes.
    pub half_open_successes: u32,
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout_ms: DEFAULT_RECOVERY_TIMEOUT_MS,
            half_open_successes: DEFAULT_HALF_OPEN_SUCCESSES,
        }
    }
}

#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    failures: u32,
    successes: u32,
    opened_at: Option<Instant>,
    /// Calls let through since the current half-open window started.
    admitted: u32,
}

impl Default for Circuit {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            successes: 0,
            opened_at: None,
            admitted: 0,
        }
    }
}

/// Point-in-time view of one provider's circuit.
#[derive(Clone, Debug, PartialEq)]
pub struct CircuitSnapshot {
    pub capability: Capability,
    pub provider: String,
    pub state: CircuitState,
    pub failures: u32,
}

type CircuitKey = (Capability, String);

fn key(capability: Capability, provider: &str) -> CircuitKey {
    (capability, provider.to_string())
}

/// Circuit breaker shared by every call resolved through one registry.
#[derive(Debug, Default)]
pub struct CircuitBreaker {
    circuits: Mutex<HashMap<CircuitKey, Circuit>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            circuits: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// A poisoned lock only means a panic mid-update; the counters are still
    /// usable, so keep going rather than take the engine down.
    fn lock(&self) -> MutexGuard<'_, HashMap<CircuitKey, Circuit>> {
        self.circuits.lock().unwrap_or_else(|poisoned| {
            warn!("Circuit breaker lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Whether `provider` may be offered to a new call for `capability`.
    ///
    /// An open circuit whose recovery timeout has passed moves to HalfOpen
    /// here. Each half-open window admits `half_open_successes` calls; the
    /// next window starts once `recovery_timeout` passes without an outcome
    /// that closes or reopens the circuit.
    pub fn allows(&self, capability: Capability, provider: &str) -> bool {
        let mut circuits = self.lock();
        let Some(circuit) = circuits.get_mut(&key(capability, provider)) else {
            return true;
        };

        let window_over = circuit
            .opened_at
            .map(|at| at.elapsed() >= self.config.recovery_timeout())
            .unwrap_or(true);

        match circuit.state {
            CircuitState::Closed => true,
            CircuitState::Open if window_over => {
                info!(
                    "Circuit for '{}' ({}) is half-open, probing again",
                    provider, capability
                );
                circuit.state = CircuitState::HalfOpen;
                circuit.successes = 0;
                circuit.admitted = 1;
                circuit.opened_at = Some(Instant::now());
                true
            }
            CircuitState::Open => false,
            CircuitState::HalfOpen if circuit.admitted < self.config.half_open_successes => {
                circuit.admitted += 1;
                true
            }
            CircuitState::HalfOpen if window_over => {
                debug!(
                    "Half-open window for '{}' ({}) expired, admitting a new trial call",
                    provider, capability
                );
                circuit.admitted = 1;
                circuit.opened_at = Some(Instant::now());
                true
            }
            CircuitState::HalfOpen => false,
        }
    }

    pub fn record_success(&self, capability: Capability, provider: &str) {
        let mut circuits = self.lock();
        let circuit = circuits.entry(key(capability, provider)).or_default();

        match circuit.state {
            CircuitState::Closed => circuit.failures = 0,
            CircuitState::HalfOpen => {
                circuit.successes += 1;
                if circuit.successes >= self.config.half_open_successes {
                    info!(
                        "Circuit for '{}' ({}) closed after {} successful trial calls",
                        provider, capability, circuit.successes
                    );
                    *circuit = Circuit::default();
                }
            }
            CircuitState::Open => {
                debug!(
                    "Ignoring success for '{}' ({}) while its circuit is open",
                    provider, capability
                );
            }
        }
    }

    pub fn record_failure(&self, capability: Capability, provider: &str) {
        let mut circuits = self.lock();
        let circuit = circuits.entry(key(capability, provider)).or_default();
        circuit.failures += 1;

        let open = match circuit.state {
            CircuitState::Closed => circuit.failures >= self.config.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };

        if open {
            warn!(
                "Opening circuit for '{}' ({}) after {} consecutive failures",
                provider, capability, circuit.failures
            );
            circuit.state = CircuitState::Open;
            circuit.successes = 0;
            circuit.admitted = 0;
            circuit.opened_at = Some(Instant::now());
        } else {
            debug!(
                "Circuit failure for '{}' ({}/{})",
                provider, circuit.failures, self.config.failure_threshold
            );
        }
    }

    pub fn state(&self, capability: Capability, provider: &str) -> CircuitState {
        self.lock()
            .get(&key(capability, provider))
            .map(|c| c.state)
            .unwrap_or(CircuitState::Closed)
    }

    pub fn reset(&self, capability: Capability, provider: &str) {
        if self.lock().remove(&key(capability, provider)).is_some() {
            info!("Circuit for '{}' ({}) reset", provider, capability);
        }
    }

    /// Snapshots of every circuit that has recorded an outcome, sorted by
    /// capability then provider name.
    pub fn snapshot(&self) -> Vec<CircuitSnapshot> {
        let mut snapshots: Vec<CircuitSnapshot> = self
            .lock()
            .iter()
            .map(|((capability, provider), circuit)| CircuitSnapshot {
                capability: *capability,
                provider: provider.clone(),
                state: circuit.state,
                failures: circuit.failures,
            })
            .collect();
        snapshots.sort_by(|a, b| {
            (a.capability, &a.provider).cmp(&(b.capability, &b.provider))
        });
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMAIL: Capability = Capability::EmailSend;

    fn breaker(threshold: u32, recovery_ms: u64, successes: u32) -> CircuitBreaker {
        CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: threshold,
            recovery_timeout_ms: recovery_ms,
            half_open_successes: successes,
        })
    }

    #[test]
    fn test_unknown_provider_is_closed() {
        let cb = CircuitBreaker::new();
        assert!(cb.allows(EMAIL, "sendgrid"));
        assert_eq!(cb.state(EMAIL, "sendgrid"), CircuitState::Closed);
        assert!(cb.snapshot().is_empty());
    }

    #[test]
    fn test_opens_at_threshold() {
        let cb = breaker(3, 60_000, 2);

        cb.record_failure(EMAIL, "mailgun");
        cb.record_failure(EMAIL, "mailgun");
        assert!(cb.allows(EMAIL, "mailgun"));

        cb.record_failure(EMAIL, "mailgun");
        assert_eq!(cb.state(EMAIL, "mailgun"), CircuitState::Open);
        assert!(!cb.allows(EMAIL, "mailgun"));
        assert!(cb.allows(EMAIL, "sendgrid"));
    }

    #[test]
    fn test_same_name_under_other_capability_is_independent() {
        let cb = breaker(1, 60_000, 1);
        cb.record_failure(EMAIL, "primary");

        assert_eq!(cb.state(EMAIL, "primary"), CircuitState::Open);
        assert!(!cb.allows(EMAIL, "primary"));
        assert_eq!(cb.state(Capability::ObjectUpload, "primary"), CircuitState::Closed);
        assert!(cb.allows(Capability::ObjectUpload, "primary"));
    }

    #[test]
    fn test_success_clears_failures() {
        let cb = breaker(2, 60_000, 2);
        cb.record_failure(Capability::LetterSend, "lob");
        cb.record_success(Capability::LetterSend, "lob");
        cb.record_failure(Capability::LetterSend, "lob");
        assert_eq!(cb.state(Capability::LetterSend, "lob"), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_cycle() {
        let cap = Capability::EnvelopeCreate;
        let cb = breaker(1, 1_000, 2);
        cb.record_failure(cap, "docusign");
        assert!(!cb.allows(cap, "docusign"));

        tokio::time::advance(Duration::from_millis(1_001)).await;
        assert!(cb.allows(cap, "docusign"));
        assert_eq!(cb.state(cap, "docusign"), CircuitState::HalfOpen);

        cb.record_success(cap, "docusign");
        assert_eq!(cb.state(cap, "docusign"), CircuitState::HalfOpen);
        cb.record_success(cap, "docusign");
        assert_eq!(cb.state(cap, "docusign"), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_a_limited_number_of_calls() {
        let cap = Capability::SearchQuery;
        let cb = breaker(1, 1_000, 2);
        cb.record_failure(cap, "elasticsearch");
        tokio::time::advance(Duration::from_millis(1_001)).await;

        assert!(cb.allows(cap, "elasticsearch"));
        assert!(cb.allows(cap, "elasticsearch"));
        assert!(!cb.allows(cap, "elasticsearch"));
        assert_eq!(cb.state(cap, "elasticsearch"), CircuitState::HalfOpen);

        // Admitted calls that never report back do not wedge the circuit.
        tokio::time::advance(Duration::from_millis(1_001)).await;
        assert!(cb.allows(cap, "elasticsearch"));
        assert!(cb.allows(cap, "elasticsearch"));
        assert!(!cb.allows(cap, "elasticsearch"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let cap = Capability::SearchQuery;
        let cb = breaker(1, 1_000, 2);
        cb.record_failure(cap, "elasticsearch");
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cb.allows(cap, "elasticsearch"));

        cb.record_failure(cap, "elasticsearch");
        assert_eq!(cb.state(cap, "elasticsearch"), CircuitState::Open);
        assert!(!cb.allows(cap, "elasticsearch"));
    }

    #[test]
    fn test_reset_and_snapshot() {
        let cb = breaker(1, 60_000, 1);
        cb.record_failure(EMAIL, "b");
        cb.record_failure(EMAIL, "a");
        cb.record_success(EMAIL, "c");
        cb.record_failure(Capability::ObjectUpload, "a");

        let keys: Vec<_> = cb
            .snapshot()
            .into_iter()
            .map(|s| (s.capability, s.provider))
            .collect();
        assert_eq!(
            keys,
            vec![
                (EMAIL, "a".to_string()),
                (EMAIL, "b".to_string()),
                (EMAIL, "c".to_string()),
                (Capability::ObjectUpload, "a".to_string()),
            ]
        );

        cb.reset(EMAIL, "a");
        assert_eq!(cb.state(EMAIL, "a"), CircuitState::Closed);
        assert_eq!(cb.state(Capability::ObjectUpload, "a"), CircuitState::Open);
        assert_eq!(cb.snapshot().len(), 3);
    }
}
