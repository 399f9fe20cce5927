//! Injectable backoff waits.

use std::time::Duration;

use async_trait::async_trait;

/// Suspends the current call for a backoff delay.
///
/// The executor only ever waits through this trait, so tests can swap in a
/// recorder and drive retries without real time passing.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

/// Waits on the tokio timer. Honours paused time in tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}
