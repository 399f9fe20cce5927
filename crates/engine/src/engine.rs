//! Engine facade: the only entry point callers use.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::time::Instant;

use crate::audit::CallLogger;
use crate::config::EngineConfig;
use crate::errors::ConfigurationError;
use crate::executor::{CallExecutor, Execution};
use crate::models::{
    CallId, Capability, CapabilityRequest, EmailMessage, EnvelopeRequest, LetterRequest,
    ObjectUpload, Params, RequestEnvelope, ResponseEnvelope, SearchQuery,
};
use crate::registry::ProviderRegistry;
use crate::retry::{RetryOverrides, Sleeper};

/// Per-call knobs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CallOptions {
    /// Provider to try first. Must be registered for the capability.
    pub preferred: Option<String>,
    /// Retry settings for this call only, over the provider's own.
    pub retry: Option<RetryOverrides>,
    /// Budget for the whole call, counted from when `call` is entered.
    pub deadline: Option<Duration>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefer(mut self, provider: impl Into<String>) -> Self {
        self.preferred = Some(provider.into());
        self
    }

    pub fn retry(mut self, retry: RetryOverrides) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Resolves, executes and audits provider calls.
///
/// Owns the registry read-only from construction on. Share across tasks with
/// an `Arc<Engine>`; concurrent calls share nothing but the registry and the
/// call logger.
pub struct Engine {
    registry: Arc<ProviderRegistry>,
    executor: CallExecutor,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        registry: ProviderRegistry,
        logger: CallLogger,
        config: EngineConfig,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let executor = CallExecutor::new(logger, config.retry.clone())
            .with_circuit_breaker(registry.circuit_breaker().cloned());

        Ok(Self {
            registry: Arc::new(registry),
            executor,
            config,
        })
    }

    /// Replace the backoff sleeper, e.g. with a recorder in tests.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.executor = self.executor.with_sleeper(sleeper);
        self
    }

    pub fn with_jitter_seed(mut self, seed: u64) -> Self {
        self.executor = self.executor.with_jitter_seed(seed);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn logger(&self) -> &CallLogger {
        self.executor.logger()
    }

    /// Capabilities with at least one registered provider.
    pub fn capabilities(&self) -> Vec<Capability> {
        self.registry.capabilities()
    }

    /// Run one logical call.
    ///
    /// Provider failures come back as [`ResponseEnvelope::Failure`]. `Err` is
    /// reserved for setup mistakes (unknown capability or provider, invalid
    /// retry overrides) and is returned before any attempt is made.
    pub async fn call(
        &self,
        capability: Capability,
        params: Params,
        options: CallOptions,
    ) -> Result<ResponseEnvelope, ConfigurationError> {
        let started = Instant::now();
        let deadline = options
            .deadline
            .or_else(|| self.config.default_deadline())
            .map(|budget| started + budget);

        let candidates = self
            .registry
            .resolve(capability, options.preferred.as_deref())?;
        let call_id = CallId::new();
        debug!(
            "Call {} for {} over {:?}",
            call_id,
            capability,
            candidates.names()
        );

        self.executor
            .execute(Execution {
                call_id,
                request: Arc::new(RequestEnvelope::new(capability, params)),
                candidates,
                retry: options.retry,
                deadline,
            })
            .await
    }

    /// [`call`](Self::call) with the capability given by wire name.
    pub async fn call_named(
        &self,
        capability: &str,
        params: Params,
        options: CallOptions,
    ) -> Result<ResponseEnvelope, ConfigurationError> {
        self.call(capability.parse()?, params, options).await
    }

    /// Call with a typed request.
    pub async fn submit<R: CapabilityRequest>(
        &self,
        request: R,
        options: CallOptions,
    ) -> Result<ResponseEnvelope, ConfigurationError> {
        let envelope = request.into_envelope();
        self.call(envelope.capability(), envelope.params().clone(), options)
            .await
    }

    pub async fn send_email(
        &self,
        message: EmailMessage,
    ) -> Result<ResponseEnvelope, ConfigurationError> {
        self.submit(message, CallOptions::default()).await
    }

    pub async fn upload_object(
        &self,
        upload: ObjectUpload,
    ) -> Result<ResponseEnvelope, ConfigurationError> {
        self.submit(upload, CallOptions::default()).await
    }

    pub async fn create_envelope(
        &self,
        envelope: EnvelopeRequest,
    ) -> Result<ResponseEnvelope, ConfigurationError> {
        self.submit(envelope, CallOptions::default()).await
    }

    pub async fn search(&self, query: SearchQuery) -> Result<ResponseEnvelope, ConfigurationError> {
        self.submit(query, CallOptions::default()).await
    }

    pub async fn send_letter(
        &self,
        letter: LetterRequest,
    ) -> Result<ResponseEnvelope, ConfigurationError> {
        self.submit(letter, CallOptions::default()).await
    }
}
