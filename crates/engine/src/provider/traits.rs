//! Provider trait definition.
//!
//! This module defines the `Provider` trait that every vendor adapter
//! implements.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::ProviderError;
use crate::models::{Capability, RequestEnvelope};

/// Outcome of one provider invocation.
pub type ProviderResult = Result<Value, ProviderError>;

/// A single vendor's implementation of one or more capabilities.
///
/// The registry hands the same instance to overlapping calls, so
/// implementations must be safe to invoke concurrently and keep no mutable
/// per-call state. A provider never retries internally: it reports one
/// outcome per invocation and marks failures `retryable` from vendor signals.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use courier_engine::provider::{Provider, ProviderResult};
/// use courier_engine::{Capability, RequestEnvelope};
///
/// struct ConsoleMailer;
///
/// #[async_trait]
/// impl Provider for ConsoleMailer {
///     fn vendor(&self) -> &str {
///         "console"
///     }
///
///     fn capabilities(&self) -> &[Capability] {
///         &[Capability::EmailSend]
///     }
///
///     async fn invoke(&self, request: &RequestEnvelope) -> ProviderResult {
///         let to = request.require_str("to")?;
///         println!("mail to {}", to);
///         Ok(serde_json::json!({ "message_id": "console" }))
///     }
/// }
/// ```
#[async_trait]
pub trait Provider: Send + Sync {
    /// Vendor identifier, e.g. "sendgrid". Used in log lines.
    fn vendor(&self) -> &str;

    /// Capabilities this provider can serve. The registry refuses to
    /// register a provider under a capability it does not list.
    fn capabilities(&self) -> &[Capability];

    /// Perform the request once.
    async fn invoke(&self, request: &RequestEnvelope) -> ProviderResult;
}
