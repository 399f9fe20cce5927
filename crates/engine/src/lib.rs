//! Courier Engine Crate
//!
//! Calls third-party services (email, object storage, e-signature, search,
//! physical mail) through one standardized contract, absorbing transient
//! failures with retry and backoff, falling back across providers, and
//! recording every attempt.
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |      Engine      |  (call / submit: one logical call)
//! +------------------+
//!          |
//!          v
//! +------------------+
//! | ProviderRegistry |  (resolve -> CandidateList, fixed per call)
//! +------------------+
//!          |
//!          v
//! +------------------+     +------------------+
//! |   CallExecutor   | --> |   RetryPolicy    |  (per candidate)
//! +------------------+     +------------------+
//!          |
//!          v
//! +------------------+     +------------------+
//! |     Provider     | --> |    CallLogger    |  (one record per attempt)
//! +------------------+     +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |    AuditSink     |  (memory, JSONL, SQLite)
//!                          +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`Capability`] - Closed set of routable actions
//! - [`RequestEnvelope`] / [`ResponseEnvelope`] - Standardized call input and outcome
//! - [`Provider`] - A vendor's implementation of one or more capabilities
//! - [`AttemptRecord`] - Immutable audit fact for one attempt
//! - [`ConfigurationError`] - The only error `Engine::call` returns

pub mod audit;
pub mod config;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod models;
pub mod provider;
pub mod registry;
pub mod retry;

pub use models::{
    AttemptOutcome, AttemptRecord, CallFailureKind, CallId, CandidateFailure, Capability,
    CapabilityRequest, EmailMessage, EnvelopeRequest, LetterRequest, ObjectUpload, Params,
    PostalAddress, RequestEnvelope, ResponseEnvelope, SearchQuery, Signer,
};

pub use errors::{AuditError, ConfigurationError, ProviderError, ProviderErrorKind, RetryClass};

pub use provider::{
    DocuSignProvider, ElasticsearchProvider, LobProvider, LocalStorageProvider, MailgunProvider,
    Provider, ProviderResult, SendGridProvider,
};

pub use registry::{
    CandidateList, CircuitBreaker, CircuitBreakerConfig, CircuitState, ProviderOptions,
    ProviderRecord, ProviderRegistry,
};

pub use retry::{RetryConfig, RetryOverrides, RetryPolicy, Sleeper, TokioSleeper};

pub use audit::{
    AttemptFilter, AttemptIter, AuditSink, AuditStats, CallLogger, JsonlSink, MemorySink,
};

pub use config::{EngineConfig, LoggerConfig};
pub use engine::{CallOptions, Engine};
pub use executor::CallExecutor;
