//! Error types and retry classification for the market data crate.
//!
//! This module provides:
//! - [`MarketDataError`]: The main error enum for all internal operations
//! - [`RetryClass`]: Classification for determining retry behavior
//! - [`InvalidSymbolError`]: The only error ever surfaced to callers of the service

mod retry;

pub use retry::RetryClass;

use thiserror::Error;

/// Errors that can occur while acquiring and reconciling readings.
///
/// All of these are handled inside the crate. Callers of
/// [`ConsensusService`](crate::service::ConsensusService) only ever see a
/// labelled `ConsensusResult` or an [`InvalidSymbolError`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketDataError {
    /// The source does not know the symbol.
    #[error("Symbol not found: {source_name} - {symbol}")]
    SymbolNotFound { source_name: String, symbol: String },

    /// The source answered with a body we could not interpret.
    #[error("Malformed response: {source_name} - {message}")]
    MalformedResponse { source_name: String, message: String },

    /// The source rejected our credential (HTTP 401/403).
    #[error("Unauthorized: {source_name}")]
    Unauthorized { source_name: String },

    /// The source responded with a non-success HTTP status.
    #[error("Upstream error: {source_name} - HTTP {status}: {message}")]
    Upstream {
        source_name: String,
        status: u16,
        message: String,
    },

    /// The source throttled us (HTTP 429 or an in-body throttle notice).
    #[error("Rate limited by upstream: {source_name}")]
    RateLimited { source_name: String },

    /// The call did not complete within the per-attempt timeout.
    #[error("Timeout: {source_name}")]
    Timeout { source_name: String },

    /// Transport-level failure talking to the source.
    #[error("Network error: {source_name} - {message}")]
    Network { source_name: String, message: String },

    /// The source's circuit is open; the adapter was not invoked.
    #[error("Circuit open: {source_name}")]
    CircuitOpen { source_name: String },

    /// The source's local token bucket is empty for this round.
    #[error("Rate limit exhausted: {source_name}")]
    RateLimitExhausted { source_name: String },

    /// The reading failed sanity checks.
    #[error("Validation failed: {source_name} - {message}")]
    ValidationFailed { source_name: String, message: String },

    /// The task calling the source ended abnormally (panicked).
    #[error("Source task failed: {source_name} - {message}")]
    TaskFailed { source_name: String, message: String },

    /// No source produced a reading this round.
    #[error("Consensus unavailable for {symbol}: {detail}")]
    ConsensusUnavailable { symbol: String, detail: String },

    /// No non-expired cache entry for the symbol.
    #[error("Cache miss: {symbol}")]
    CacheMiss { symbol: String },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MarketDataError {
    /// Returns the retry classification for this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use quorum_market_data::errors::{MarketDataError, RetryClass};
    ///
    /// let error = MarketDataError::Timeout { source_name: "yahoo".to_string() };
    /// assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    ///
    /// let error = MarketDataError::SymbolNotFound {
    ///     source_name: "yahoo".to_string(),
    ///     symbol: "NOPE".to_string(),
    /// };
    /// assert_eq!(error.retry_class(), RetryClass::Never);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Timeout { .. } | Self::Network { .. } | Self::RateLimited { .. } => {
                RetryClass::WithBackoff
            }
            Self::Upstream { status, .. } if *status >= 500 => RetryClass::WithBackoff,

            Self::MalformedResponse { .. }
            | Self::Unauthorized { .. }
            | Self::Upstream { .. }
            | Self::ValidationFailed { .. } => RetryClass::FailWithPenalty,

            Self::CircuitOpen { .. } | Self::RateLimitExhausted { .. } => RetryClass::Unavailable,

            Self::SymbolNotFound { .. }
            | Self::TaskFailed { .. }
            | Self::ConsensusUnavailable { .. }
            | Self::CacheMiss { .. }
            | Self::Config(_) => RetryClass::Never,
        }
    }

    /// True for transient provider faults (the `retryable` flag of a source error).
    pub fn is_retryable(&self) -> bool {
        self.retry_class().is_retryable()
    }

    /// HTTP-equivalent status describing the failure, when one applies.
    pub fn status_hint(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            Self::Unauthorized { .. } => Some(401),
            Self::SymbolNotFound { .. } => Some(404),
            Self::Timeout { .. } => Some(504),
            _ => None,
        }
    }

    /// Name of the source involved, for per-source errors.
    pub fn source_name(&self) -> Option<&str> {
        match self {
            Self::SymbolNotFound { source_name, .. }
            | Self::MalformedResponse { source_name, .. }
            | Self::Unauthorized { source_name }
            | Self::Upstream { source_name, .. }
            | Self::RateLimited { source_name }
            | Self::Timeout { source_name }
            | Self::Network { source_name, .. }
            | Self::CircuitOpen { source_name }
            | Self::RateLimitExhausted { source_name }
            | Self::ValidationFailed { source_name, .. }
            | Self::TaskFailed { source_name, .. } => Some(source_name),
            Self::ConsensusUnavailable { .. } | Self::CacheMiss { .. } | Self::Config(_) => None,
        }
    }
}

/// Malformed caller input. A caller bug, not a runtime condition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid symbol '{symbol}': {reason}")]
pub struct InvalidSymbolError {
    pub symbol: String,
    pub reason: String,
}
