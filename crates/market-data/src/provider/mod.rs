//! Source adapter abstractions and implementations.
//!
//! This module contains:
//! - The `SourceAdapter` trait that every upstream source implements
//! - Shared HTTP status classification
//! - Concrete adapters (Yahoo, Finnhub, Alpha Vantage)
//!
//! # Architecture
//!
//! Adapters are pure translation layers:
//! - **Provider-aware**: They are the only code that knows a provider's request and response shape
//! - **Stateless**: No retries, backoff, health tracking or rate limiting happen here
//! - **Testable**: Every adapter takes a base URL so it can run against a mock server

pub(crate) mod http;
mod traits;

pub mod alpha_vantage;
pub mod finnhub;
pub mod yahoo;

pub use alpha_vantage::AlphaVantageAdapter;
pub use finnhub::FinnhubAdapter;
pub use http::DEFAULT_HTTP_TIMEOUT;
pub use traits::SourceAdapter;
pub use yahoo::YahooAdapter;
