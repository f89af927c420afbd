//! Consensus service: the only entry point callers use.
//!
//! `get_consensus` always answers with a labelled [`ConsensusResult`]:
//! live (FULL / PARTIAL) when any source produced a reading, CACHED from the
//! last-known-good store when none did, and DEGRADED with a reason when the
//! cache has nothing fresh either. The only error is [`InvalidSymbolError`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cache::ConsensusCache;
use crate::consensus::ConsensusAggregator;
use crate::errors::InvalidSymbolError;
use crate::models::{ConsensusResult, SourceStatus};

/// Longest symbol accepted.
pub const MAX_SYMBOL_LEN: usize = 32;

/// Punctuation allowed in symbols: `BRK.B`, `BTC-USD`, `^VIX`, `EURUSD=X`,
/// `ES_F`, `BTC/USD`.
const SYMBOL_PUNCTUATION: &[char] = &['.', '-', '^', '=', '_', '/'];

/// Trait for the consensus surface, so callers can hold `Arc<dyn ...>`.
#[async_trait]
pub trait ConsensusServiceTrait: Send + Sync {
    /// Best available answer for `symbol`. Never fails for provider-side problems.
    async fn get_consensus(&self, symbol: &str) -> Result<ConsensusResult, InvalidSymbolError>;

    /// Operational status of every configured source.
    fn get_source_status(&self) -> BTreeMap<String, SourceStatus>;
}

/// Check and canonicalize a caller-supplied symbol.
///
/// Trims whitespace and upper-cases. Rejects empty or over-long symbols,
/// characters outside ASCII alphanumerics and `. - ^ = _ /`, and symbols
/// made only of punctuation.
pub fn validate_symbol(raw: &str) -> Result<String, InvalidSymbolError> {
    let invalid = |reason: &str| InvalidSymbolError {
        symbol: raw.to_string(),
        reason: reason.to_string(),
    };

    let symbol = raw.trim();
    if symbol.is_empty() {
        return Err(invalid("symbol is empty"));
    }
    if symbol.chars().count() > MAX_SYMBOL_LEN {
        return Err(invalid("symbol is longer than 32 characters"));
    }
    if let Some(bad) = symbol
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !SYMBOL_PUNCTUATION.contains(c))
    {
        return Err(InvalidSymbolError {
            symbol: raw.to_string(),
            reason: format!("unexpected character '{}'", bad),
        });
    }
    if !symbol.chars().any(|c| c.is_ascii_alphanumeric()) {
        return Err(invalid("symbol has no letters or digits"));
    }

    Ok(symbol.to_ascii_uppercase())
}

/// Orchestrates live rounds, the cache fallback and degraded answers.
pub struct ConsensusService {
    aggregator: ConsensusAggregator,
    cache: Arc<ConsensusCache>,
}

impl ConsensusService {
    pub fn new(aggregator: ConsensusAggregator, cache: Arc<ConsensusCache>) -> Self {
        Self { aggregator, cache }
    }

    pub fn cache(&self) -> &Arc<ConsensusCache> {
        &self.cache
    }

    pub async fn get_consensus(&self, symbol: &str) -> Result<ConsensusResult, InvalidSymbolError> {
        let symbol = validate_symbol(symbol)?;
        debug!("Consensus requested for {}", symbol);

        let outcome = self.aggregator.run_round(&symbol).await;
        let now = Utc::now();

        let failure = match outcome.result {
            Ok(result) => {
                self.cache.put(&result, now);
                return Ok(result);
            }
            Err(e) => e,
        };

        match self.cache.get_fresh(&symbol, now) {
            Ok(entry) => {
                let age_secs = entry.age(now).as_secs() as i64;
                info!(
                    "Serving cached consensus for {} ({}s old): {}",
                    symbol, age_secs, failure
                );
                Ok(entry.value.into_cached(age_secs))
            }
            Err(miss) => {
                let reason = format!(
                    "no source produced a reading ({}); no fresh cached value",
                    outcome.diagnostics.unavailable_summary()
                );
                warn!("Degraded consensus for {}: {} [{}]", symbol, reason, miss);
                Ok(ConsensusResult::degraded(symbol, reason, now))
            }
        }
    }

    pub fn get_source_status(&self) -> BTreeMap<String, SourceStatus> {
        self.aggregator.registry().status()
    }
}

#[async_trait]
impl ConsensusServiceTrait for ConsensusService {
    async fn get_consensus(&self, symbol: &str) -> Result<ConsensusResult, InvalidSymbolError> {
        ConsensusService::get_consensus(self, symbol).await
    }

    fn get_source_status(&self) -> BTreeMap<String, SourceStatus> {
        ConsensusService::get_source_status(self)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::cache::CacheConfig;
    use crate::consensus::{ConsensusConfig, RoundConfig};
    use crate::models::{Confidence, Quality};
    use crate::registry::{CircuitBreakerConfig, CircuitState, RetryExecutor, RetryPolicy};
    use crate::test_support::{registry_of, timeout_error, MockAdapter};

    fn service(adapters: &[(Arc<MockAdapter>, f64)], cache: CacheConfig) -> ConsensusService {
        let registry = registry_of(adapters, CircuitBreakerConfig::default());
        let aggregator = ConsensusAggregator::new(
            Arc::new(registry),
            RetryExecutor::new(RetryPolicy::default()),
            ConsensusConfig::default(),
            RoundConfig::default(),
        );
        ConsensusService::new(aggregator, Arc::new(ConsensusCache::new(cache)))
    }

    #[test]
    fn test_validate_symbol() {
        assert_eq!(validate_symbol(" aapl ").unwrap(), "AAPL");
        assert_eq!(validate_symbol("^vix").unwrap(), "^VIX");
        assert_eq!(validate_symbol("EURUSD=X").unwrap(), "EURUSD=X");
        assert_eq!(validate_symbol("brk.b").unwrap(), "BRK.B");
        assert_eq!(validate_symbol("BTC-USD").unwrap(), "BTC-USD");

        assert!(validate_symbol("").is_err());
        assert!(validate_symbol("   ").is_err());
        assert!(validate_symbol("^^^").is_err());
        assert!(validate_symbol("AA PL").is_err());
        assert!(validate_symbol("DROP;TABLE").is_err());
        assert!(validate_symbol("ÄPFEL").is_err());
        assert!(validate_symbol(&"A".repeat(33)).is_err());
        assert!(validate_symbol(&"A".repeat(32)).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_symbol_is_the_only_error() {
        let service = service(&[(MockAdapter::ok("a", dec!(1), dec!(0)), 1.0)], CacheConfig::default());
        let error = service.get_consensus("bad symbol!").await.unwrap_err();
        assert_eq!(error.symbol, "bad symbol!");
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_answer_is_cached() {
        let service = service(
            &[
                (MockAdapter::ok("a", dec!(100), dec!(1.0)), 1.0),
                (MockAdapter::ok("b", dec!(110), dec!(1.0)), 1.0),
            ],
            CacheConfig::default(),
        );

        let result = service.get_consensus("aapl").await.unwrap();

        assert_eq!(result.symbol, "AAPL");
        assert_eq!(result.quality, Quality::Full);
        assert_eq!(result.consensus_price, Some(dec!(105)));
        assert_eq!(service.cache().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_to_fresh_cache() {
        let source = MockAdapter::ok("a", dec!(100), dec!(1.5));
        let service = service(&[(source.clone(), 1.0)], CacheConfig::default());

        let live = service.get_consensus("AAPL").await.unwrap();
        source.set_answer(Err(timeout_error("a")));

        let call_start = Utc::now();
        let cached = service.get_consensus("AAPL").await.unwrap();

        assert_eq!(cached.quality, Quality::Cached);
        assert!(cached.as_of <= call_start);
        assert_eq!(cached.consensus_price, live.consensus_price);
        assert_eq!(cached.consensus_change_percent, live.consensus_change_percent);
        assert_eq!(cached.as_of, live.as_of);
        assert_eq!(cached.sources_used, live.sources_used);
        assert!(cached.age_secs.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_answer_predates_call_by_round_deadline() {
        let source = MockAdapter::ok("a", dec!(100), dec!(1.5));
        let service = service(&[(source.clone(), 1.0)], CacheConfig::default());

        let mut earlier = service.get_consensus("AAPL").await.unwrap();
        source.set_answer(Err(timeout_error("a")));
        let stored_at = Utc::now() - chrono::Duration::seconds(20);
        earlier.as_of = stored_at;
        service.cache().put(&earlier, stored_at);

        let call_start = Utc::now();
        let cached = service.get_consensus("AAPL").await.unwrap();

        let deadline = chrono::Duration::from_std(RoundConfig::default().round_deadline).unwrap();
        assert_eq!(cached.quality, Quality::Cached);
        assert_eq!(cached.as_of, stored_at);
        assert!(call_start - cached.as_of > deadline);
        assert!(cached.age_secs.unwrap() >= 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflowing_weights_degrade_instead_of_panicking() {
        let service = service(
            &[
                (MockAdapter::ok("a", dec!(900000000), dec!(1.0)), 1e25),
                (MockAdapter::ok("b", dec!(900000000), dec!(1.1)), 1e25),
            ],
            CacheConfig::default(),
        );

        let result = service.get_consensus("AAPL").await.unwrap();

        assert_eq!(result.quality, Quality::Degraded);
        assert!(result.consensus_price.is_none());
        assert!(service.cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_degraded_without_cache() {
        let service = service(
            &[
                (MockAdapter::failing("a", timeout_error("a")), 1.0),
                (MockAdapter::failing("b", timeout_error("b")), 1.0),
            ],
            CacheConfig::default(),
        );

        let result = service.get_consensus("AAPL").await.unwrap();

        assert_eq!(result.quality, Quality::Degraded);
        assert_eq!(result.confidence, Confidence::Low);
        assert!(result.consensus_price.is_none());
        assert!(result.consensus_change_percent.is_none());
        assert!(result.sources_used.is_empty());
        let reason = result.unavailable_reason.unwrap();
        assert!(reason.contains("a: Timeout"), "{}", reason);
        assert!(reason.contains("no fresh cached value"), "{}", reason);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_cache_is_degraded() {
        let source = MockAdapter::ok("a", dec!(100), dec!(1.5));
        let service = service(&[(source.clone(), 1.0)], CacheConfig::default());

        let mut earlier = service.get_consensus("AAPL").await.unwrap();
        source.set_answer(Err(timeout_error("a")));
        // Older than the quote TTL
        let stored_at = Utc::now() - chrono::Duration::hours(2);
        earlier.as_of = stored_at;
        service.cache().put(&earlier, stored_at);

        let result = service.get_consensus("AAPL").await.unwrap();
        assert_eq!(result.quality, Quality::Degraded);
        assert!(result.consensus_price.is_none());
        assert!(service.cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_status_after_failures() {
        let service = service(
            &[
                (MockAdapter::failing("a", timeout_error("a")), 1.0),
                (MockAdapter::ok("b", dec!(10), dec!(0)), 2.0),
            ],
            CacheConfig::default(),
        );

        // Two rounds of three failed attempts each opens the five-failure circuit
        service.get_consensus("AAPL").await.unwrap();
        service.get_consensus("AAPL").await.unwrap();

        let status = service.get_source_status();
        assert_eq!(status.len(), 2);
        assert_eq!(status["a"].circuit_state, CircuitState::Open);
        assert_eq!(status["b"].circuit_state, CircuitState::Closed);
        assert_eq!(status["b"].weight, 2.0);
        assert!(status["a"].enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trait_object_surface() {
        let service: Arc<dyn ConsensusServiceTrait> = Arc::new(service(
            &[(MockAdapter::ok("a", dec!(42), dec!(0.1)), 1.0)],
            CacheConfig::default(),
        ));
        let result = service.get_consensus("MSFT").await.unwrap();
        assert_eq!(result.quality, Quality::Full);
        assert_eq!(result.confidence, Confidence::Low);
        assert!(service.get_source_status().contains_key("a"));
    }
}
