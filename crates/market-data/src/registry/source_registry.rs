//! Source registry: the arena of per-source state.
//!
//! Each configured source owns exactly one entry holding its static
//! configuration, its adapter, its circuit breaker and its token bucket.
//! Nothing is global, so a fresh registry gives a test a clean world.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, warn};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use super::diagnostics::SkipReason;
use super::rate_limiter::TokenBucket;
use crate::errors::MarketDataError;
use crate::models::{SourceConfig, SourceStatus};
use crate::provider::SourceAdapter;

/// Everything the aggregator needs to call one source.
pub struct SourceEntry {
    config: SourceConfig,
    adapter: Arc<dyn SourceAdapter>,
    breaker: Arc<CircuitBreaker>,
    bucket: TokenBucket,
    disabled_reason: Option<SkipReason>,
}

impl SourceEntry {
    pub fn new(
        config: SourceConfig,
        adapter: Arc<dyn SourceAdapter>,
        breaker_config: CircuitBreakerConfig,
    ) -> Self {
        let disabled_reason = (!config.enabled).then_some(SkipReason::Disabled);
        Self {
            breaker: Arc::new(CircuitBreaker::with_config(config.name.clone(), breaker_config)),
            bucket: TokenBucket::new(config.name.clone(), config.rate_limit),
            adapter,
            config,
            disabled_reason,
        }
    }

    fn disable(mut self, reason: SkipReason) -> Self {
        self.disabled_reason = Some(reason);
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    pub fn weight(&self) -> f64 {
        self.config.weight
    }

    pub fn adapter(&self) -> &Arc<dyn SourceAdapter> {
        &self.adapter
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn bucket(&self) -> &TokenBucket {
        &self.bucket
    }

    pub fn is_enabled(&self) -> bool {
        self.disabled_reason.is_none()
    }

    pub fn disabled_reason(&self) -> Option<&SkipReason> {
        self.disabled_reason.as_ref()
    }

    pub fn status(&self) -> SourceStatus {
        SourceStatus {
            enabled: self.is_enabled(),
            circuit_state: self.breaker.state(),
            weight: self.config.weight,
            priority: self.config.priority,
            consecutive_failures: self.breaker.consecutive_failures(),
            remaining_calls: self.bucket.remaining(),
            disabled_reason: self.disabled_reason.as_ref().map(|r| r.to_string()),
        }
    }
}

impl std::fmt::Debug for SourceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceEntry")
            .field("name", &self.config.name)
            .field("weight", &self.config.weight)
            .field("priority", &self.config.priority)
            .field("disabled_reason", &self.disabled_reason)
            .finish()
    }
}

/// Reads a credential from the process environment.
pub fn env_credential(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

/// Registry of all configured sources, ordered by priority then name.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    entries: Vec<Arc<SourceEntry>>,
    breaker_config: CircuitBreakerConfig,
}

impl SourceRegistry {
    pub fn new(breaker_config: CircuitBreakerConfig) -> Self {
        Self {
            entries: Vec::new(),
            breaker_config,
        }
    }

    /// Register a source, resolving its credential from the environment.
    pub fn register(
        &mut self,
        config: SourceConfig,
        adapter: Arc<dyn SourceAdapter>,
    ) -> Result<(), MarketDataError> {
        self.register_with(config, adapter, env_credential)
    }

    /// Register a source, resolving its credential through `lookup`.
    ///
    /// A credentialed source whose key is missing or blank is kept but
    /// disabled; it is reported by [`status`](Self::status) and never called.
    pub fn register_with(
        &mut self,
        config: SourceConfig,
        adapter: Arc<dyn SourceAdapter>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), MarketDataError> {
        config.validate()?;

        if self.get(&config.name).is_some() {
            return Err(MarketDataError::Config(format!(
                "source '{}' is configured more than once",
                config.name
            )));
        }

        let has_credential = !config.requires_credential
            || config
                .credential_env
                .as_deref()
                .and_then(&lookup)
                .map(|key| !key.trim().is_empty())
                .unwrap_or(false);

        let mut entry = SourceEntry::new(config, adapter, self.breaker_config.clone());
        if entry.is_enabled() && !has_credential {
            warn!(
                "Source '{}' requires a credential ({}) that is not set; disabling it",
                entry.name(),
                entry.config.credential_env.as_deref().unwrap_or("<unnamed>")
            );
            entry = entry.disable(SkipReason::MissingCredential);
        }

        debug!(
            "Registered source '{}' (weight {}, priority {}, enabled {})",
            entry.name(),
            entry.weight(),
            entry.config.priority,
            entry.is_enabled()
        );

        self.entries.push(Arc::new(entry));
        self.entries.sort_by(|a, b| {
            a.config
                .priority
                .cmp(&b.config.priority)
                .then_with(|| a.config.name.cmp(&b.config.name))
        });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<SourceEntry>> {
        self.entries.iter().find(|e| e.name() == name)
    }

    /// All sources, enabled or not, in priority order.
    pub fn entries(&self) -> &[Arc<SourceEntry>] {
        &self.entries
    }

    /// Sources eligible to be called, in priority order.
    pub fn enabled_sources(&self) -> Vec<Arc<SourceEntry>> {
        self.entries
            .iter()
            .filter(|e| e.is_enabled())
            .cloned()
            .collect()
    }

    pub fn enabled_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_enabled()).count()
    }

    /// Per-source operational status, including disabled sources.
    pub fn status(&self) -> BTreeMap<String, SourceStatus> {
        self.entries
            .iter()
            .map(|e| (e.name().to_string(), e.status()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
