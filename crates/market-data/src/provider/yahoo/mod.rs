//! Yahoo Finance source adapter.
//!
//! Reads the v8 chart endpoint, which needs no credential and covers
//! equities, indices (`^GSPC`), volatility indices (`^VIX`) and FX
//! reference rates (`EURUSD=X`). The percent change is derived from the
//! previous close in the response metadata.

mod models;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use tracing::debug;

use self::models::YahooChartResponse;
use super::http::{self, DEFAULT_HTTP_TIMEOUT};
use crate::errors::MarketDataError;
use crate::models::Reading;
use crate::provider::SourceAdapter;

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
pub const SOURCE_NAME: &str = "yahoo";

/// Yahoo Finance adapter.
pub struct YahooAdapter {
    client: Client,
    base_url: String,
}

impl YahooAdapter {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: http::build_client(timeout),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the adapter at another host (used against mock servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn parse_reading(&self, symbol: &str, body: &str) -> Result<Reading, MarketDataError> {
        let response: YahooChartResponse = http::parse_json(SOURCE_NAME, body)?;

        if let Some(error) = response.chart.error {
            debug!(
                "Yahoo chart error for {}: {:?} {:?}",
                symbol, error.code, error.description
            );
            return Err(MarketDataError::SymbolNotFound {
                source_name: SOURCE_NAME.to_string(),
                symbol: symbol.to_string(),
            });
        }

        let meta = response
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .map(|result| result.meta)
            .ok_or_else(|| MarketDataError::SymbolNotFound {
                source_name: SOURCE_NAME.to_string(),
                symbol: symbol.to_string(),
            })?;

        let price = meta
            .regular_market_price
            .ok_or_else(|| MarketDataError::SymbolNotFound {
                source_name: SOURCE_NAME.to_string(),
                symbol: symbol.to_string(),
            })?;
        let price = http::decimal_from_f64(SOURCE_NAME, "regularMarketPrice", price)?;

        let previous_close = meta.reference_close().ok_or_else(|| {
            MarketDataError::MalformedResponse {
                source_name: SOURCE_NAME.to_string(),
                message: format!("No previous close for {}", symbol),
            }
        })?;
        let previous_close = http::decimal_from_f64(SOURCE_NAME, "previousClose", previous_close)?;

        let change_percent = http::percent_change(price, previous_close).ok_or_else(|| {
            MarketDataError::MalformedResponse {
                source_name: SOURCE_NAME.to_string(),
                message: format!("Zero previous close for {}", symbol),
            }
        })?;

        let timestamp = meta
            .regular_market_time
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or_else(Utc::now);

        Ok(Reading::new(symbol, price, change_percent, timestamp, SOURCE_NAME))
    }
}

impl Default for YahooAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for YahooAdapter {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch(&self, symbol: &str) -> Result<Reading, MarketDataError> {
        let url = format!(
            "{}/v8/finance/chart/{}",
            self.base_url,
            urlencoding::encode(symbol)
        );
        debug!("Yahoo request: {}", url);

        let request = self
            .client
            .get(&url)
            .query(&[("interval", "1d"), ("range", "1d")]);
        let body = http::send_for_text(request, SOURCE_NAME, symbol).await?;

        self.parse_reading(symbol, &body)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn chart_body(price: f64, previous_close: f64) -> serde_json::Value {
        json!({
            "chart": {
                "result": [{
                    "meta": {
                        "symbol": "AAPL",
                        "currency": "USD",
                        "regularMarketPrice": price,
                        "regularMarketTime": 1700000000,
                        "chartPreviousClose": previous_close
                    }
                }],
                "error": null
            }
        })
    }

    fn adapter_for(server: &MockServer) -> YahooAdapter {
        YahooAdapter::new().with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_fetch_maps_chart_meta() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/AAPL"))
            .and(query_param("range", "1d"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chart_body(110.0, 100.0)))
            .mount(&server)
            .await;

        let reading = adapter_for(&server).fetch("AAPL").await.unwrap();

        assert_eq!(reading.symbol, "AAPL");
        assert_eq!(reading.price, dec!(110));
        assert_eq!(reading.change_percent, dec!(10));
        assert_eq!(reading.source_name, "yahoo");
        assert_eq!(reading.timestamp.timestamp(), 1700000000);
    }

    #[tokio::test]
    async fn test_index_symbol_is_url_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/v8/finance/chart/%5EGSPC$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chart_body(5000.0, 4950.0)))
            .mount(&server)
            .await;

        let reading = adapter_for(&server).fetch("^GSPC").await.unwrap();
        assert_eq!(reading.symbol, "^GSPC");
        assert_eq!(reading.price, dec!(5000));
    }

    #[tokio::test]
    async fn test_not_found_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "chart": {
                    "result": null,
                    "error": { "code": "Not Found", "description": "No data found" }
                }
            })))
            .mount(&server)
            .await;

        let error = adapter_for(&server).fetch("NOPE").await.unwrap_err();
        assert!(matches!(error, MarketDataError::SymbolNotFound { .. }));
        assert!(!error.is_retryable());
    }

    #[tokio::test]
    async fn test_error_body_with_ok_status_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "chart": { "result": [], "error": null }
            })))
            .mount(&server)
            .await;

        let error = adapter_for(&server).fetch("NOPE").await.unwrap_err();
        assert!(matches!(error, MarketDataError::SymbolNotFound { .. }));
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let error = adapter_for(&server).fetch("AAPL").await.unwrap_err();
        assert!(matches!(error, MarketDataError::Upstream { status: 503, .. }));
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn test_throttle_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let error = adapter_for(&server).fetch("AAPL").await.unwrap_err();
        assert!(matches!(error, MarketDataError::RateLimited { .. }));
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn test_garbage_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let error = adapter_for(&server).fetch("AAPL").await.unwrap_err();
        assert!(matches!(error, MarketDataError::MalformedResponse { .. }));
        assert!(!error.is_retryable());
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(chart_body(1.0, 1.0))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let adapter = YahooAdapter::with_timeout(Duration::from_millis(50)).with_base_url(server.uri());
        let error = adapter.fetch("AAPL").await.unwrap_err();
        assert!(matches!(error, MarketDataError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let adapter = YahooAdapter::new().with_base_url("http://127.0.0.1:1");
        let error = adapter.fetch("AAPL").await.unwrap_err();
        assert!(matches!(
            error,
            MarketDataError::Network { .. } | MarketDataError::Timeout { .. }
        ));
        assert!(error.is_retryable());
    }
}
