//! Provider registry: named providers grouped by capability.
//!
//! Populated once at startup through [`ProviderRegistry::register`], then
//! moved into the [`Engine`](crate::Engine) where it is only read. Each call
//! resolves a fresh [`CandidateList`] that stays fixed for the whole call.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::CircuitBreaker;
use crate::errors::ConfigurationError;
use crate::models::Capability;
use crate::provider::Provider;
use crate::retry::RetryOverrides;

/// Static metadata attached to a provider at registration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderOptions {
    /// When false the provider gets exactly one attempt per call.
    pub supports_retry: bool,
    /// Never chosen as the implicit primary; ordered after everything else.
    pub fallback_only: bool,
    /// Provider-specific retry settings, layered over the engine default.
    pub retry: Option<RetryOverrides>,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            supports_retry: true,
            fallback_only: false,
            retry: None,
        }
    }
}

impl ProviderOptions {
    pub fn fallback_only() -> Self {
        Self {
            fallback_only: true,
            ..Self::default()
        }
    }

    pub fn without_retry(mut self) -> Self {
        self.supports_retry = false;
        self
    }

    pub fn with_retry(mut self, retry: RetryOverrides) -> Self {
        self.retry = Some(retry);
        self
    }
}

/// One registered provider.
pub struct ProviderRecord {
    capability: Capability,
    name: String,
    provider: Arc<dyn Provider>,
    options: ProviderOptions,
}

impl ProviderRecord {
    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn options(&self) -> &ProviderOptions {
        &self.options
    }
}

impl fmt::Debug for ProviderRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRecord")
            .field("capability", &self.capability)
            .field("name", &self.name)
            .field("vendor", &self.provider.vendor())
            .field("options", &self.options)
            .finish()
    }
}

/// Ordered providers for one call: index 0 is the primary, the rest are
/// fallbacks in the order they will be tried.
#[derive(Clone, Debug)]
pub struct CandidateList {
    capability: Capability,
    candidates: Vec<Arc<ProviderRecord>>,
}

impl CandidateList {
    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn primary(&self) -> Option<&ProviderRecord> {
        self.candidates.first().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProviderRecord> {
        self.candidates.iter().map(Arc::as_ref)
    }

    pub fn names(&self) -> Vec<&str> {
        self.iter().map(ProviderRecord::name).collect()
    }
}

/// Registered providers keyed by capability, in registration order.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<Capability, Vec<Arc<ProviderRecord>>>,
    defaults: HashMap<Capability, String>,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leave providers with an open circuit out of new candidate lists.
    pub fn with_circuit_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.circuit_breaker = Some(Arc::new(breaker));
        self
    }

    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.circuit_breaker.as_ref()
    }

    /// Register `provider` under `(capability, name)`.
    pub fn register(
        &mut self,
        capability: Capability,
        name: impl Into<String>,
        provider: Arc<dyn Provider>,
        options: ProviderOptions,
    ) -> Result<(), ConfigurationError> {
        let name = name.into();

        if !provider.capabilities().contains(&capability) {
            return Err(ConfigurationError::UnsupportedCapability { capability, name });
        }
        if let Some(retry) = &options.retry {
            retry.apply(&Default::default()).validate()?;
        }

        let records = self.providers.entry(capability).or_default();
        if records.iter().any(|r| r.name == name) {
            return Err(ConfigurationError::DuplicateProvider { capability, name });
        }

        info!(
            "Registered provider '{}' ({}) for {}{}",
            name,
            provider.vendor(),
            capability,
            if options.fallback_only { " as fallback" } else { "" }
        );
        records.push(Arc::new(ProviderRecord {
            capability,
            name,
            provider,
            options,
        }));
        Ok(())
    }

    /// Make `name` the primary for `capability` when a call names no preference.
    pub fn set_default(
        &mut self,
        capability: Capability,
        name: impl Into<String>,
    ) -> Result<(), ConfigurationError> {
        let name = name.into();
        if self.find(capability, &name).is_none() {
            return Err(ConfigurationError::UnknownProvider { capability, name });
        }
        self.defaults.insert(capability, name);
        Ok(())
    }

    pub fn default_for(&self, capability: Capability) -> Option<&str> {
        self.defaults.get(&capability).map(String::as_str)
    }

    /// Capabilities with at least one provider, in declaration order.
    pub fn capabilities(&self) -> Vec<Capability> {
        Capability::ALL
            .iter()
            .copied()
            .filter(|c| self.providers.get(c).is_some_and(|r| !r.is_empty()))
            .collect()
    }

    /// Provider names for `capability`, in registration order.
    pub fn providers(&self, capability: Capability) -> Vec<&str> {
        self.providers
            .get(&capability)
            .map(|records| records.iter().map(|r| r.name.as_str()).collect())
            .unwrap_or_default()
    }

    fn find(&self, capability: Capability, name: &str) -> Option<&Arc<ProviderRecord>> {
        self.providers
            .get(&capability)
            .and_then(|records| records.iter().find(|r| r.name == name))
    }

    /// Ordered candidates for one call.
    ///
    /// Order: the preferred provider (or the configured default), then the
    /// remaining regular providers, then fallback-only providers, each group
    /// in registration order.
    pub fn resolve(
        &self,
        capability: Capability,
        preferred: Option<&str>,
    ) -> Result<CandidateList, ConfigurationError> {
        let records = self
            .providers
            .get(&capability)
            .filter(|r| !r.is_empty())
            .ok_or(ConfigurationError::UnknownCapability(capability))?;

        let primary = match preferred {
            Some(name) => Some(self.find(capability, name).ok_or_else(|| {
                ConfigurationError::UnknownProvider {
                    capability,
                    name: name.to_string(),
                }
            })?),
            None => self
                .default_for(capability)
                .and_then(|name| self.find(capability, name)),
        };

        let mut ordered: Vec<Arc<ProviderRecord>> = Vec::with_capacity(records.len());
        if let Some(primary) = primary {
            ordered.push(Arc::clone(primary));
        }
        for fallback_pass in [false, true] {
            ordered.extend(
                records
                    .iter()
                    .filter(|r| r.options.fallback_only == fallback_pass)
                    .filter(|r| primary.map_or(true, |p| !Arc::ptr_eq(p, r)))
                    .cloned(),
            );
        }

        let candidates = self.apply_circuit_breaker(capability, ordered);
        debug!(
            "Resolved {} for {}: {:?}",
            capability,
            preferred.unwrap_or("<default>"),
            candidates.iter().map(|r| r.name.as_str()).collect::<Vec<_>>()
        );

        Ok(CandidateList {
            capability,
            candidates,
        })
    }

    /// Drop providers whose circuit is open. If that would leave nothing,
    /// keep the full list so the call still has somewhere to go.
    fn apply_circuit_breaker(
        &self,
        capability: Capability,
        ordered: Vec<Arc<ProviderRecord>>,
    ) -> Vec<Arc<ProviderRecord>> {
        let Some(breaker) = &self.circuit_breaker else {
            return ordered;
        };

        let allowed: Vec<_> = ordered
            .iter()
            .filter(|r| breaker.allows(capability, &r.name))
            .cloned()
            .collect();

        if allowed.is_empty() {
            warn!(
                "Every circuit for {} is open, trying all providers anyway",
                capability
            );
            return ordered;
        }
        if allowed.len() < ordered.len() {
            debug!(
                "Circuit breaker removed {} provider(s) for {}",
                ordered.len() - allowed.len(),
                capability
            );
        }
        allowed
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers)
            .field("defaults", &self.defaults)
            .field("circuit_breaker", &self.circuit_breaker.is_some())
            .finish()
    }
}
