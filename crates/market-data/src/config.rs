//! Feed configuration.
//!
//! [`FeedConfig`] bundles every tunable of the consensus feed. It deserializes
//! from JSON with every field optional, then environment overrides
//! (`QUORUM_*`) are applied on top. [`FeedConfig::build_service`] turns it
//! into a ready [`ConsensusService`].

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::{CacheConfig, ConsensusCache};
use crate::consensus::{ConsensusAggregator, ConsensusConfig, RoundConfig};
use crate::errors::MarketDataError;
use crate::models::{RateLimitSpec, SourceConfig};
use crate::provider::{alpha_vantage, finnhub, yahoo, SourceAdapter};
use crate::provider::{AlphaVantageAdapter, FinnhubAdapter, YahooAdapter};
use crate::registry::{env_credential, CircuitBreakerConfig, RetryExecutor, RetryPolicy, SourceRegistry};
use crate::service::ConsensusService;

pub const ENV_OUTLIER_THRESHOLD_PERCENT: &str = "QUORUM_OUTLIER_THRESHOLD_PERCENT";
pub const ENV_MIN_SOURCES_FOR_HIGH_CONFIDENCE: &str = "QUORUM_MIN_SOURCES_FOR_HIGH_CONFIDENCE";
pub const ENV_CIRCUIT_FAILURE_THRESHOLD: &str = "QUORUM_CIRCUIT_FAILURE_THRESHOLD";
pub const ENV_CIRCUIT_OPEN_DURATION_SECS: &str = "QUORUM_CIRCUIT_OPEN_DURATION_SECS";
pub const ENV_CACHE_TTL_SECS: &str = "QUORUM_CACHE_TTL_SECS";
pub const ENV_ROUND_DEADLINE_MS: &str = "QUORUM_ROUND_DEADLINE_MS";

const MAX_ROUND_DEADLINE: Duration = Duration::from_secs(3600);
const MAX_RETRY_JITTER: Duration = Duration::from_secs(60);

/// Every tunable of the feed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedConfig {
    pub sources: Vec<SourceConfig>,
    pub consensus: ConsensusConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryPolicy,
    pub round: RoundConfig,
    pub cache: CacheConfig,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            consensus: ConsensusConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryPolicy::default(),
            round: RoundConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

/// Yahoo is keyless and ranks first; Finnhub and Alpha Vantage need keys.
pub fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig::new(yahoo::SOURCE_NAME)
            .with_priority(1)
            .with_rate_limit(RateLimitSpec::per_minute(60)),
        SourceConfig::new(finnhub::SOURCE_NAME)
            .with_priority(2)
            .with_credential(finnhub::CREDENTIAL_ENV)
            .with_rate_limit(RateLimitSpec::per_minute(60)),
        SourceConfig::new(alpha_vantage::SOURCE_NAME)
            .with_priority(3)
            .with_credential(alpha_vantage::CREDENTIAL_ENV)
            .with_rate_limit(RateLimitSpec::per_minute(5)),
    ]
}

impl FeedConfig {
    pub fn from_json(json: &str) -> Result<Self, MarketDataError> {
        serde_json::from_str(json)
            .map_err(|e| MarketDataError::Config(format!("invalid feed configuration: {}", e)))
    }

    /// Read a JSON file; environment overrides are not applied.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MarketDataError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            MarketDataError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_json(&json)?;
        info!("Loaded feed configuration from {}", path.display());
        Ok(config)
    }

    /// Apply `QUORUM_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, MarketDataError> {
        self.with_overrides(|var| std::env::var(var).ok())
    }

    /// Apply `QUORUM_*` overrides resolved through `lookup`.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, MarketDataError> {
        if let Some(threshold) = parse_override::<Decimal>(&lookup, ENV_OUTLIER_THRESHOLD_PERCENT)? {
            self.consensus.outlier_threshold_percent = threshold;
        }
        if let Some(min) = parse_override::<usize>(&lookup, ENV_MIN_SOURCES_FOR_HIGH_CONFIDENCE)? {
            self.consensus.min_sources_for_high_confidence = min;
        }
        if let Some(threshold) = parse_override::<u32>(&lookup, ENV_CIRCUIT_FAILURE_THRESHOLD)? {
            self.circuit_breaker.failure_threshold = threshold;
        }
        if let Some(secs) = parse_override::<u64>(&lookup, ENV_CIRCUIT_OPEN_DURATION_SECS)? {
            self.circuit_breaker.open_duration = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_override::<u64>(&lookup, ENV_CACHE_TTL_SECS)? {
            self.cache.cache_ttl_secs = Some(secs);
        }
        if let Some(ms) = parse_override::<u64>(&lookup, ENV_ROUND_DEADLINE_MS)? {
            self.round.round_deadline = Duration::from_millis(ms);
        }
        Ok(self)
    }

    /// Check cross-field invariants. Per-source checks run at registration.
    pub fn validate(&self) -> Result<(), MarketDataError> {
        self.consensus.validate()?;
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(MarketDataError::Config(
                "circuit breaker failure threshold must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(MarketDataError::Config(
                "retry policy needs at least one attempt".to_string(),
            ));
        }
        if self.round.round_deadline.is_zero() {
            return Err(MarketDataError::Config(
                "round deadline must be positive".to_string(),
            ));
        }
        if self.round.round_deadline > MAX_ROUND_DEADLINE {
            return Err(MarketDataError::Config(format!(
                "round deadline must not exceed {}s",
                MAX_ROUND_DEADLINE.as_secs()
            )));
        }
        if self.retry.max_jitter > MAX_RETRY_JITTER {
            return Err(MarketDataError::Config(format!(
                "retry jitter must not exceed {}s",
                MAX_RETRY_JITTER.as_secs()
            )));
        }
        if self.round.max_in_flight == Some(0) {
            return Err(MarketDataError::Config(
                "maxInFlight must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the registry, reading credentials from the environment.
    pub fn build_registry(&self) -> Result<SourceRegistry, MarketDataError> {
        self.build_registry_with(env_credential)
    }

    /// Build the registry, resolving credentials through `lookup`.
    pub fn build_registry_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<SourceRegistry, MarketDataError> {
        let mut registry = SourceRegistry::new(self.circuit_breaker.clone());
        for source in &self.sources {
            let credential = source
                .credential_env
                .as_deref()
                .and_then(&lookup)
                .unwrap_or_default();
            let adapter = self.adapter_for(&source.name, credential)?;
            registry.register_with(source.clone(), adapter, &lookup)?;
        }
        debug!(
            "Built registry with {} sources ({} enabled)",
            registry.len(),
            registry.enabled_count()
        );
        Ok(registry)
    }

    fn adapter_for(
        &self,
        name: &str,
        credential: String,
    ) -> Result<Arc<dyn SourceAdapter>, MarketDataError> {
        let timeout = self.retry.attempt_timeout;
        let adapter: Arc<dyn SourceAdapter> = match name {
            yahoo::SOURCE_NAME => Arc::new(YahooAdapter::with_timeout(timeout)),
            finnhub::SOURCE_NAME => Arc::new(FinnhubAdapter::with_timeout(credential, timeout)),
            alpha_vantage::SOURCE_NAME => {
                Arc::new(AlphaVantageAdapter::with_timeout(credential, timeout))
            }
            other => {
                return Err(MarketDataError::Config(format!(
                    "unknown source '{}' (expected one of {}, {}, {})",
                    other,
                    yahoo::SOURCE_NAME,
                    finnhub::SOURCE_NAME,
                    alpha_vantage::SOURCE_NAME
                )))
            }
        };
        Ok(adapter)
    }

    /// Build a service over the given registry.
    pub fn build_service_with_registry(
        &self,
        registry: SourceRegistry,
    ) -> Result<ConsensusService, MarketDataError> {
        self.validate()?;
        let aggregator = ConsensusAggregator::new(
            Arc::new(registry),
            RetryExecutor::new(self.retry.clone()),
            self.consensus.clone(),
            self.round.clone(),
        );
        let cache = Arc::new(ConsensusCache::new(self.cache.clone()));
        Ok(ConsensusService::new(aggregator, cache))
    }

    /// Build the service with the real adapters and environment credentials.
    pub fn build_service(&self) -> Result<ConsensusService, MarketDataError> {
        self.validate()?;
        let registry = self.build_registry()?;
        self.build_service_with_registry(registry)
    }
}

fn parse_override<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
) -> Result<Option<T>, MarketDataError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<T>()
        .map(Some)
        .map_err(|e| MarketDataError::Config(format!("{}={:?} is invalid: {}", var, raw, e)))
}
