//! Source adapter trait definition.
//!
//! This module defines the `SourceAdapter` trait that every upstream
//! provider implements.

use async_trait::async_trait;

use crate::errors::MarketDataError;
use crate::models::Reading;

/// Trait for upstream market data sources.
///
/// An adapter is a pure translation layer: it issues one request, maps the
/// provider's success shape into a [`Reading`] and its failure shapes into
/// [`MarketDataError`]. It never retries, sleeps or tracks health; the
/// registry's retry executor, circuit breaker and rate limiter do that.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use quorum_market_data::errors::MarketDataError;
/// use quorum_market_data::models::Reading;
/// use quorum_market_data::provider::SourceAdapter;
///
/// struct MySource {
///     api_key: String,
/// }
///
/// #[async_trait]
/// impl SourceAdapter for MySource {
///     fn name(&self) -> &str {
///         "my_source"
///     }
///
///     async fn fetch(&self, symbol: &str) -> Result<Reading, MarketDataError> {
///         // call the API and map the response
///     }
/// }
/// ```
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Name of the source.
    ///
    /// Matches `SourceConfig::name` and is used in errors, logs and
    /// `sources_used` lists.
    fn name(&self) -> &str;

    /// Fetch the latest reading for an upper-cased symbol.
    ///
    /// Retryable failures are timeouts, transport errors, HTTP 429 and 5xx.
    /// Unknown symbols and malformed responses are terminal.
    async fn fetch(&self, symbol: &str) -> Result<Reading, MarketDataError>;
}
