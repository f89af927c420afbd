//! Quorum Market Data Crate
//!
//! This crate reconciles quotes from several independent market-data
//! providers into one consensus answer per symbol, and keeps answering when
//! providers fail, throttle or disagree.
//!
//! # Overview
//!
//! The market data crate supports:
//! - Multiple providers behind one adapter trait: Yahoo Finance, Finnhub, Alpha Vantage
//! - Per-source rate limiting, circuit breaking and jittered retries
//! - Weighted consensus with outlier flagging and confidence labels
//! - A last-known-good cache with explicit CACHED / DEGRADED labelling
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! | ConsensusService |  (validation, cache fallback)
//! +------------------+
//!          |
//!          v
//! +---------------------+
//! | ConsensusAggregator |  (concurrent round, deadlines)
//! +---------------------+
//!          |  one task per enabled source
//!          v
//! +------------------+     +----------------------------------+
//! |  RetryExecutor   | --> | TokenBucket -> CircuitBreaker    |
//! +------------------+     +----------------------------------+
//!          |
//!          v
//! +------------------+
//! |  SourceAdapter   |  (Yahoo, Finnhub, AlphaVantage)
//! +------------------+
//!          |
//!          v
//! +------------------+
//! |     Reading      |  -> calculator -> ConsensusResult
//! +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`ConsensusResult`] - The reconciled answer with confidence and quality labels
//! - [`Reading`] - One source's normalized price and daily change
//! - [`SourceConfig`] - Static per-source settings (weight, priority, credential, rate limit)
//! - [`SourceStatus`] - Per-source operational view for dashboards
//! - [`FeedConfig`] - Every tunable, loadable from JSON and `QUORUM_*` variables

pub mod cache;
pub mod config;
pub mod consensus;
pub mod errors;
pub mod models;
pub mod provider;
pub mod registry;
pub mod service;

#[cfg(test)]
mod test_support;

// Re-export all public types from models
pub use models::{
    CacheEntry, Confidence, ConsensusResult, DataClass, Quality, RateLimitSpec, Reading,
    SourceConfig, SourceName, SourceStatus,
};

pub use cache::{CacheConfig, ConsensusCache};
pub use config::FeedConfig;
pub use consensus::{
    ConsensusAggregator, ConsensusConfig, OutlierPolicy, OutlierReference, RoundConfig,
    RoundOutcome,
};
pub use errors::{InvalidSymbolError, MarketDataError, RetryClass};

// Re-export provider types
pub use provider::{AlphaVantageAdapter, FinnhubAdapter, SourceAdapter, YahooAdapter};

// Re-export registry types
pub use registry::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, RetryExecutor, RetryPolicy,
    RoundDiagnostics, SkipReason, SourceOutcome, SourceRegistry, TokenBucket,
};

pub use service::{validate_symbol, ConsensusService, ConsensusServiceTrait};
