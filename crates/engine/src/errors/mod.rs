//! Error types and retry classification for the engine.
//!
//! This module provides:
//! - [`ConfigurationError`]: caller usage mistakes, surfaced synchronously
//! - [`ProviderError`]: structured failures reported by a provider attempt
//! - [`RetryClass`]: how the executor treats a provider failure
//! - [`AuditError`]: call logger sink failures

mod provider;
mod retry;

pub use provider::{ProviderError, ProviderErrorKind};
pub use retry::RetryClass;

use thiserror::Error;

use crate::models::Capability;

/// Errors caused by how the engine was set up or called.
///
/// These never describe a runtime condition of a provider. They are the only
/// errors that escape [`Engine::call`](crate::Engine::call); everything else is
/// folded into the response envelope.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// No provider is registered for the capability.
    #[error("No providers registered for capability: {0}")]
    UnknownCapability(Capability),

    /// A capability name that does not parse.
    #[error("Unknown capability name: {0}")]
    UnknownCapabilityName(String),

    /// The (capability, name) pair was registered twice.
    #[error("Provider '{name}' is already registered for {capability}")]
    DuplicateProvider { capability: Capability, name: String },

    /// A preferred or default provider name that is not registered.
    #[error("Provider '{name}' is not registered for {capability}")]
    UnknownProvider { capability: Capability, name: String },

    /// The provider does not declare the capability it is registered under.
    #[error("Provider '{name}' does not support {capability}")]
    UnsupportedCapability { capability: Capability, name: String },

    /// Retry parameters that cannot produce a sane schedule.
    #[error("Invalid retry configuration: {0}")]
    InvalidRetryConfig(String),

    /// Any other rejected setting.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Failures of the audit trail itself.
///
/// These are reported and counted but never abort a call.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Audit sink I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audit record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Audit storage failed: {0}")]
    Storage(String),

    /// The writer task is gone, so nothing more can be flushed or queried.
    #[error("Call logger writer has stopped")]
    WriterStopped,
}
