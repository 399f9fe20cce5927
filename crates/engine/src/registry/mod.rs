//! Provider registry module.
//!
//! - Provider registration, defaults and candidate ordering
//! - Optional circuit breaking across calls

mod circuit_breaker;
mod provider_registry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState};
pub use provider_registry::{CandidateList, ProviderOptions, ProviderRecord, ProviderRegistry};
