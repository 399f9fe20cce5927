//! Call executor: drives one logical call across its candidates.
//!
//! For each candidate in order, attempts repeat under that candidate's
//! [`RetryPolicy`] until it succeeds or gives up. Every attempt is handed to
//! the [`CallLogger`] before any backoff wait starts. Errors never escape as
//! `Err`: the outcome is always a [`ResponseEnvelope`].

mod invocation;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use tokio::time::Instant;

use crate::audit::{mask_params, CallLogger};
use crate::errors::{ConfigurationError, ProviderError, ProviderErrorKind};
use crate::models::{
    AttemptOutcome, AttemptRecord, CallFailureKind, CallId, CandidateFailure, RequestEnvelope,
    ResponseEnvelope,
};
use crate::registry::{CandidateList, CircuitBreaker, ProviderRecord};
use crate::retry::{
    GiveUpReason, RetryConfig, RetryDecision, RetryOverrides, RetryPolicy, RetryState, Sleeper,
    TokioSleeper,
};
use invocation::Invocation;

/// Everything the executor needs to run one call.
#[derive(Debug)]
pub struct Execution {
    pub call_id: CallId,
    pub request: Arc<RequestEnvelope>,
    pub candidates: CandidateList,
    /// Per-call retry overrides, applied on top of each provider's settings.
    pub retry: Option<RetryOverrides>,
    /// Absolute end of the call's budget.
    pub deadline: Option<Instant>,
}

pub struct CallExecutor {
    logger: CallLogger,
    default_retry: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
    jitter_seed: Option<u64>,
}

impl CallExecutor {
    pub fn new(logger: CallLogger, default_retry: RetryConfig) -> Self {
        Self {
            logger,
            default_retry,
            sleeper: Arc::new(TokioSleeper),
            circuit_breaker: None,
            jitter_seed: None,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_circuit_breaker(mut self, breaker: Option<Arc<CircuitBreaker>>) -> Self {
        self.circuit_breaker = breaker;
        self
    }

    /// Seed jitter so retry schedules are reproducible.
    pub fn with_jitter_seed(mut self, seed: u64) -> Self {
        self.jitter_seed = Some(seed);
        self
    }

    pub fn logger(&self) -> &CallLogger {
        &self.logger
    }

    /// Effective policy for one candidate: engine default, then the
    /// provider's overrides, then the call's. Providers that do not support
    /// retry always get a single attempt.
    pub fn policy_for(
        &self,
        record: &ProviderRecord,
        call: Option<&RetryOverrides>,
    ) -> Result<RetryPolicy, ConfigurationError> {
        let mut config = self.default_retry.clone();
        if let Some(provider) = &record.options().retry {
            config = provider.apply(&config);
        }
        if let Some(call) = call {
            config = call.apply(&config);
        }
        if !record.options().supports_retry {
            config.max_attempts = 1;
        }
        RetryPolicy::new(config)
    }

    /// Run the call to its single response envelope.
    ///
    /// Only fails when a candidate's layered retry settings are invalid, and
    /// then before any attempt is made.
    pub async fn execute(
        &self,
        execution: Execution,
    ) -> Result<ResponseEnvelope, ConfigurationError> {
        let policies = execution
            .candidates
            .iter()
            .map(|record| self.policy_for(record, execution.retry.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut run = CallRun::new(self, &execution);
        for (record, policy) in execution.candidates.iter().zip(&policies) {
            match run.drive_candidate(record, policy).await {
                CandidateOutcome::Succeeded(payload) => {
                    return Ok(ResponseEnvelope::Success {
                        call_id: execution.call_id,
                        provider: record.name().to_string(),
                        payload,
                        attempts: run.total_attempts,
                    });
                }
                CandidateOutcome::DeadlineExceeded => return Ok(run.deadline_failure()),
                CandidateOutcome::GaveUp => {}
            }
        }

        Ok(run.exhausted_failure())
    }
}

enum CandidateOutcome {
    Succeeded(Value),
    GaveUp,
    DeadlineExceeded,
}

/// Mutable state of one call in progress. Lives only inside `execute`.
struct CallRun<'a> {
    executor: &'a CallExecutor,
    execution: &'a Execution,
    request_snapshot: Option<Value>,
    rng: StdRng,
    total_attempts: u32,
    failures: Vec<CandidateFailure>,
}

impl<'a> CallRun<'a> {
    fn new(executor: &'a CallExecutor, execution: &'a Execution) -> Self {
        let request_snapshot = executor
            .logger
            .config()
            .record_request_params
            .then(|| mask_params(execution.request.params()));
        let rng = match executor.jitter_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            executor,
            execution,
            request_snapshot,
            rng,
            total_attempts: 0,
            failures: Vec::new(),
        }
    }

    fn remaining(&self) -> Option<Duration> {
        self.execution
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    async fn drive_candidate(
        &mut self,
        record: &ProviderRecord,
        policy: &RetryPolicy,
    ) -> CandidateOutcome {
        let call_id = self.execution.call_id;
        let request = Arc::clone(&self.execution.request);
        let mut state = RetryState::new();

        loop {
            if self.remaining() == Some(Duration::ZERO) {
                self.note_failure(record, state.attempt(), &deadline_error());
                return CandidateOutcome::DeadlineExceeded;
            }

            let attempt = state.start_attempt();
            self.total_attempts += 1;
            debug!(
                "Call {}: attempt {}/{} on '{}' for {}",
                call_id,
                attempt,
                policy.max_attempts(),
                record.name(),
                request.capability()
            );

            let started_at = Utc::now();
            let clock = Instant::now();
            let invocation = invocation::invoke(
                record.name(),
                record.provider().as_ref(),
                &request,
                self.execution.deadline,
            )
            .await;
            let duration = clock.elapsed();

            let result = match invocation {
                Invocation::Completed(result) => result,
                Invocation::DeadlineExceeded => {
                    let error = deadline_error();
                    self.log_attempt(
                        record,
                        attempt,
                        started_at,
                        duration,
                        AttemptOutcome::Cancelled,
                        Some(&error),
                    );
                    self.note_failure(record, attempt, &error);
                    return CandidateOutcome::DeadlineExceeded;
                }
            };

            let decision = policy.decide(&state, &result, &mut self.rng);
            state.finish_attempt(&decision, result.as_ref().err());

            match result {
                Ok(payload) => {
                    self.log_attempt(
                        record,
                        attempt,
                        started_at,
                        duration,
                        AttemptOutcome::Success,
                        None,
                    );
                    if let Some(breaker) = &self.executor.circuit_breaker {
                        breaker.record_success(record.capability(), record.name());
                    }
                    info!(
                        "Call {}: '{}' succeeded on attempt {}",
                        call_id,
                        record.name(),
                        attempt
                    );
                    return CandidateOutcome::Succeeded(payload);
                }
                Err(error) => {
                    let outcome = if error.retryable {
                        AttemptOutcome::RetryableFailure
                    } else {
                        AttemptOutcome::PermanentFailure
                    };
                    self.log_attempt(
                        record,
                        attempt,
                        started_at,
                        duration,
                        outcome,
                        Some(&error),
                    );

                    match decision {
                        RetryDecision::Retry { delay } => {
                            warn!(
                                "Call {}: '{}' attempt {} failed ({}), retrying in {:?}",
                                call_id,
                                record.name(),
                                attempt,
                                error,
                                delay
                            );
                            if let Some(remaining) = self.remaining().filter(|r| *r <= delay) {
                                self.executor.sleeper.sleep(remaining).await;
                                self.note_failure(record, attempt, &error);
                                return CandidateOutcome::DeadlineExceeded;
                            }
                            self.executor.sleeper.sleep(delay).await;
                            state.resume();
                        }
                        _ => {
                            // Only exhausted retries count against the circuit.
                            let exhausted =
                                decision == RetryDecision::GiveUp(GiveUpReason::Exhausted);
                            if exhausted {
                                if let Some(breaker) = &self.executor.circuit_breaker {
                                    breaker
                                        .record_failure(record.capability(), record.name());
                                }
                            }
                            info!(
                                "Call {}: giving up on '{}' after {} attempt(s){}: {}",
                                call_id,
                                record.name(),
                                attempt,
                                if exhausted { "" } else { " on a permanent error" },
                                error
                            );
                            self.note_failure(record, attempt, &error);
                            return CandidateOutcome::GaveUp;
                        }
                    }
                }
            }
        }
    }

    fn log_attempt(
        &self,
        record: &ProviderRecord,
        attempt: u32,
        started_at: DateTime<Utc>,
        duration: Duration,
        outcome: AttemptOutcome,
        error: Option<&ProviderError>,
    ) {
        let (error_kind, error_message) = match (outcome, error) {
            (AttemptOutcome::Cancelled, _) => (
                Some(CallFailureKind::DeadlineExceeded.as_str().to_string()),
                error.map(|e| e.message.clone()),
            ),
            (_, Some(error)) => (
                Some(error.kind.as_str().to_string()),
                Some(error.message.clone()),
            ),
            (_, None) => (None, None),
        };

        self.executor.logger.append(AttemptRecord {
            call_id: self.execution.call_id,
            provider: record.name().to_string(),
            capability: self.execution.request.capability(),
            attempt,
            started_at,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            outcome,
            error_kind,
            error_message,
            request: self.request_snapshot.clone(),
        });
    }

    fn note_failure(&mut self, record: &ProviderRecord, attempts: u32, error: &ProviderError) {
        self.failures.push(CandidateFailure {
            provider: record.name().to_string(),
            attempts,
            kind: error.kind,
            message: error.message.clone(),
        });
    }

    fn deadline_failure(self) -> ResponseEnvelope {
        warn!(
            "Call {}: deadline exceeded after {} attempt(s)",
            self.execution.call_id, self.total_attempts
        );
        ResponseEnvelope::Failure {
            call_id: self.execution.call_id,
            kind: CallFailureKind::DeadlineExceeded,
            message: format!(
                "deadline exceeded after {} attempt(s)",
                self.total_attempts
            ),
            exhausted: false,
            attempts: self.total_attempts,
            failures: self.failures,
        }
    }

    fn exhausted_failure(self) -> ResponseEnvelope {
        let summary = self
            .failures
            .iter()
            .map(|f| format!("{}: {}", f.provider, f.message))
            .collect::<Vec<_>>()
            .join("; ");
        error!(
            "Call {}: all providers exhausted for {} ({})",
            self.execution.call_id,
            self.execution.request.capability(),
            summary
        );

        ResponseEnvelope::Failure {
            call_id: self.execution.call_id,
            kind: CallFailureKind::AllProvidersExhausted,
            message: format!(
                "All providers exhausted for {}: {}",
                self.execution.request.capability(),
                summary
            ),
            exhausted: true,
            attempts: self.total_attempts,
            failures: self.failures,
        }
    }
}

fn deadline_error() -> ProviderError {
    ProviderError::permanent(ProviderErrorKind::Timeout, "call deadline exceeded")
}
