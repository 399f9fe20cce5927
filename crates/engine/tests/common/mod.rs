//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use courier_engine::{
    AttemptFilter, AttemptRecord, CallId, CallLogger, Capability, Engine, EngineConfig,
    LoggerConfig, MemorySink, Provider, ProviderError, ProviderErrorKind, ProviderOptions,
    ProviderRegistry, ProviderResult, RequestEnvelope, RetryConfig, Sleeper,
};
use serde_json::{json, Value};

/// Provider that replays a script of results, then repeats `fallback`.
pub struct ScriptedProvider {
    name: &'static str,
    script: Mutex<VecDeque<ProviderResult>>,
    fallback: ProviderResult,
    latency: Duration,
    calls: AtomicU32,
}

impl ScriptedProvider {
    pub fn new(name: &'static str, script: Vec<ProviderResult>) -> Self {
        Self {
            name,
            script: Mutex::new(script.into()),
            fallback: ok(name),
            latency: Duration::ZERO,
            calls: AtomicU32::new(0),
        }
    }

    pub fn always(name: &'static str, result: ProviderResult) -> Self {
        Self {
            fallback: result,
            ..Self::new(name, Vec::new())
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn vendor(&self) -> &str {
        self.name
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::EmailSend, Capability::ObjectUpload]
    }

    async fn invoke(&self, _request: &RequestEnvelope) -> ProviderResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Provider whose invocation panics.
pub struct PanickingProvider;

#[async_trait]
impl Provider for PanickingProvider {
    fn vendor(&self) -> &str {
        "panicking"
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::EmailSend]
    }

    async fn invoke(&self, _request: &RequestEnvelope) -> ProviderResult {
        panic!("adapter bug");
    }
}

/// Sleeper that records requested delays and returns at once.
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, delay: Duration) {
        self.delays.lock().unwrap().push(delay);
    }
}

pub fn ok(provider: &str) -> ProviderResult {
    Ok(json!({ "message_id": format!("{}-1", provider) }))
}

pub fn transient() -> ProviderResult {
    Err(ProviderError::retryable(
        ProviderErrorKind::Unavailable,
        "HTTP 503 - service unavailable",
    ))
}

pub fn permanent() -> ProviderResult {
    Err(ProviderError::permanent(
        ProviderErrorKind::InvalidRequest,
        "HTTP 400 - bad request",
    ))
}

pub fn params() -> courier_engine::Params {
    match json!({ "to": "ops@example.com", "subject": "Hi", "content": "Body" }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

/// Retry settings without jitter so delays are exact.
pub fn exact_retry() -> RetryConfig {
    RetryConfig {
        jitter_fraction: 0.0,
        ..RetryConfig::default()
    }
}

pub struct Harness {
    pub engine: Engine,
    pub sink: Arc<MemorySink>,
    pub sleeper: Arc<RecordingSleeper>,
}

impl Harness {
    pub async fn records(&self, call_id: CallId) -> Vec<AttemptRecord> {
        self.engine
            .logger()
            .query(&AttemptFilter::new().call_id(call_id))
            .await
            .unwrap()
            .collect()
    }
}

/// Type-erase a provider for [`harness`].
pub fn candidate<P: Provider + 'static>(
    provider: &Arc<P>,
    options: ProviderOptions,
) -> (Arc<dyn Provider>, ProviderOptions) {
    (provider.clone(), options)
}

/// Engine over the given providers for `email.send`, registered in order.
pub fn harness(
    providers: Vec<(Arc<dyn Provider>, ProviderOptions)>,
    config: EngineConfig,
) -> Harness {
    let mut registry = ProviderRegistry::new();
    for (provider, options) in providers {
        let name = provider.vendor().to_string();
        registry
            .register(Capability::EmailSend, name, provider, options)
            .unwrap();
    }

    let sink = Arc::new(MemorySink::new());
    let logger = CallLogger::spawn(sink.clone(), LoggerConfig::default());
    let sleeper = Arc::new(RecordingSleeper::default());
    let engine = Engine::new(registry, logger, config)
        .unwrap()
        .with_sleeper(sleeper.clone())
        .with_jitter_seed(42);

    Harness {
        engine,
        sink,
        sleeper,
    }
}

pub fn exact_config() -> EngineConfig {
    EngineConfig {
        retry: exact_retry(),
        ..EngineConfig::default()
    }
}
