//! One provider invocation, bounded by the call deadline and shielded from
//! provider panics.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use log::error;
use tokio::time::Instant;

use crate::errors::ProviderError;
use crate::models::RequestEnvelope;
use crate::provider::{Provider, ProviderResult};

pub(crate) enum Invocation {
    Completed(ProviderResult),
    /// The deadline passed first; the provider future was dropped.
    DeadlineExceeded,
}

pub(crate) async fn invoke(
    name: &str,
    provider: &dyn Provider,
    request: &RequestEnvelope,
    deadline: Option<Instant>,
) -> Invocation {
    let call = AssertUnwindSafe(provider.invoke(request)).catch_unwind();

    let outcome = match deadline {
        Some(deadline) => match tokio::time::timeout_at(deadline, call).await {
            Ok(outcome) => outcome,
            Err(_) => return Invocation::DeadlineExceeded,
        },
        None => call.await,
    };

    match outcome {
        Ok(result) => Invocation::Completed(result),
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!("Provider '{}' panicked: {}", name, message);
            Invocation::Completed(Err(ProviderError::fault(format!(
                "provider panicked: {}",
                message
            ))))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderErrorKind;
    use crate::models::{Capability, Params};
    use async_trait::async_trait;
    use std::time::Duration;

    struct Panicking;

    #[async_trait]
    impl Provider for Panicking {
        fn vendor(&self) -> &str {
            "panicking"
        }

        fn capabilities(&self) -> &[Capability] {
            &[Capability::SearchQuery]
        }

        async fn invoke(&self, _request: &RequestEnvelope) -> ProviderResult {
            panic!("index out of bounds");
        }
    }

    struct Slow;

    #[async_trait]
    impl Provider for Slow {
        fn vendor(&self) -> &str {
            "slow"
        }

        fn capabilities(&self) -> &[Capability] {
            &[Capability::SearchQuery]
        }

        async fn invoke(&self, _request: &RequestEnvelope) -> ProviderResult {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(serde_json::Value::Null)
        }
    }

    fn request() -> RequestEnvelope {
        RequestEnvelope::new(Capability::SearchQuery, Params::new())
    }

    #[tokio::test]
    async fn test_panic_becomes_permanent_fault() {
        match invoke("panicking", &Panicking, &request(), None).await {
            Invocation::Completed(Err(error)) => {
                assert_eq!(error.kind, ProviderErrorKind::Fault);
                assert!(!error.retryable);
                assert!(error.message.contains("index out of bounds"));
            }
            _ => panic!("expected a fault"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_abandons_invocation() {
        let deadline = Instant::now() + Duration::from_millis(100);
        let outcome = invoke("slow", &Slow, &request(), Some(deadline)).await;
        assert!(matches!(outcome, Invocation::DeadlineExceeded));
        assert!(Instant::now() < deadline + Duration::from_secs(1));
    }
}
