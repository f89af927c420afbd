//! Finnhub source adapter.
//!
//! Reads the `/quote` endpoint: `c` (current price), `dp` (percent change)
//! and `t` (Unix timestamp). Finnhub answers unknown symbols with HTTP 200
//! and an all-zero body, which is mapped to `SymbolNotFound`.
//!
//! The free tier allows 60 API calls per minute.
//! API documentation: https://finnhub.io/docs/api

use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::http::{self, DEFAULT_HTTP_TIMEOUT};
use crate::errors::MarketDataError;
use crate::models::Reading;
use crate::provider::SourceAdapter;

pub const DEFAULT_BASE_URL: &str = "https://finnhub.io/api/v1";
pub const SOURCE_NAME: &str = "finnhub";
pub const CREDENTIAL_ENV: &str = "FINNHUB_API_KEY";

/// Response from /quote endpoint
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    /// Current price
    c: Option<f64>,
    /// Percent change
    dp: Option<f64>,
    /// Previous close
    pc: Option<f64>,
    /// Timestamp (Unix)
    t: Option<i64>,
    // Note: d, h, l, o exist but are not needed for a reading
}

/// Finnhub adapter.
pub struct FinnhubAdapter {
    client: Client,
    api_key: String,
    base_url: String,
}

impl FinnhubAdapter {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_timeout(api_key, DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: http::build_client(timeout),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the adapter at another host (used against mock servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn parse_reading(&self, symbol: &str, body: &str) -> Result<Reading, MarketDataError> {
        let response: QuoteResponse = http::parse_json(SOURCE_NAME, body)?;

        let not_found = || MarketDataError::SymbolNotFound {
            source_name: SOURCE_NAME.to_string(),
            symbol: symbol.to_string(),
        };

        let close = response.c.ok_or_else(not_found)?;
        // Finnhub returns zeros for unknown symbols instead of an error
        if close == 0.0 && response.pc.unwrap_or(0.0) == 0.0 {
            return Err(not_found());
        }

        let price = http::decimal_from_f64(SOURCE_NAME, "c", close)?;

        let change_percent = match response.dp {
            Some(dp) => http::decimal_from_f64(SOURCE_NAME, "dp", dp)?,
            None => {
                let previous = response.pc.ok_or_else(|| MarketDataError::MalformedResponse {
                    source_name: SOURCE_NAME.to_string(),
                    message: format!("No percent change or previous close for {}", symbol),
                })?;
                let previous = http::decimal_from_f64(SOURCE_NAME, "pc", previous)?;
                http::percent_change(price, previous).ok_or_else(|| {
                    MarketDataError::MalformedResponse {
                        source_name: SOURCE_NAME.to_string(),
                        message: format!("Zero previous close for {}", symbol),
                    }
                })?
            }
        };

        let timestamp = response
            .t
            .filter(|ts| *ts > 0)
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or_else(Utc::now);

        Ok(Reading::new(symbol, price, change_percent, timestamp, SOURCE_NAME))
    }
}

#[async_trait]
impl SourceAdapter for FinnhubAdapter {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch(&self, symbol: &str) -> Result<Reading, MarketDataError> {
        let url = format!("{}/quote", self.base_url);
        debug!("Finnhub request: /quote for {}", symbol);

        // API key as header rather than query param
        let request = self
            .client
            .get(&url)
            .header("X-Finnhub-Token", &self.api_key)
            .query(&[("symbol", symbol)]);
        let body = http::send_for_text(request, SOURCE_NAME, symbol).await?;

        self.parse_reading(symbol, &body)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn adapter_for(server: &MockServer) -> FinnhubAdapter {
        FinnhubAdapter::new("test-key").with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_fetch_quote_with_token_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quote"))
            .and(query_param("symbol", "AAPL"))
            .and(header("X-Finnhub-Token", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "c": 189.5, "d": 2.5, "dp": 1.3369, "h": 190.0, "l": 187.0,
                "o": 187.5, "pc": 187.0, "t": 1700000000
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reading = adapter_for(&server).fetch("AAPL").await.unwrap();

        assert_eq!(reading.price, dec!(189.5));
        assert_eq!(reading.change_percent, dec!(1.3369));
        assert_eq!(reading.source_name, "finnhub");
        assert_eq!(reading.timestamp.timestamp(), 1700000000);
    }

    #[tokio::test]
    async fn test_missing_dp_is_derived_from_previous_close() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "c": 110.0, "dp": null, "pc": 100.0, "t": 1700000000
            })))
            .mount(&server)
            .await;

        let reading = adapter_for(&server).fetch("AAPL").await.unwrap();
        assert_eq!(reading.change_percent, dec!(10));
    }

    #[tokio::test]
    async fn test_all_zero_body_is_symbol_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "c": 0, "d": null, "dp": null, "h": 0, "l": 0, "o": 0, "pc": 0, "t": 0
            })))
            .mount(&server)
            .await;

        let error = adapter_for(&server).fetch("NOPE").await.unwrap_err();
        assert!(matches!(error, MarketDataError::SymbolNotFound { .. }));
        assert!(!error.retry_class().penalizes_circuit());
    }

    #[tokio::test]
    async fn test_invalid_key_is_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({ "error": "Invalid API key" })),
            )
            .mount(&server)
            .await;

        let error = adapter_for(&server).fetch("AAPL").await.unwrap_err();
        assert!(matches!(error, MarketDataError::Unauthorized { .. }));
        assert!(!error.is_retryable());
        assert!(error.retry_class().penalizes_circuit());
    }

    #[tokio::test]
    async fn test_rate_limited_and_server_errors_are_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("symbol", "AAPL"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("symbol", "MSFT"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let adapter = adapter_for(&server);
        let throttled = adapter.fetch("AAPL").await.unwrap_err();
        let bad_gateway = adapter.fetch("MSFT").await.unwrap_err();

        assert!(matches!(throttled, MarketDataError::RateLimited { .. }));
        assert!(throttled.is_retryable());
        assert_eq!(bad_gateway.status_hint(), Some(502));
        assert!(bad_gateway.is_retryable());
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let error = adapter_for(&server).fetch("AAPL").await.unwrap_err();
        assert!(matches!(error, MarketDataError::MalformedResponse { .. }));
    }
}
