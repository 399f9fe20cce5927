//! Retry policy: backoff schedule, per-candidate state machine, and the
//! sleep abstraction the executor waits through.

mod policy;
mod sleeper;

pub use policy::{
    GiveUpReason, RetryConfig, RetryDecision, RetryOverrides, RetryPhase, RetryPolicy, RetryState,
};
pub use sleeper::{Sleeper, TokioSleeper};
