//! Alpha Vantage source adapter.
//!
//! Reads the `GLOBAL_QUOTE` function. Alpha Vantage reports most problems
//! with HTTP 200 and a message in the body:
//! - `Error Message`: invalid call, usually an unknown symbol
//! - `Note` / `Information`: throttling or daily quota notices
//! - an empty `Global Quote` object: no data for the symbol
//!
//! Note: the free tier is limited to 5 API calls per minute.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use super::http::{self, DEFAULT_HTTP_TIMEOUT};
use crate::errors::MarketDataError;
use crate::models::Reading;
use crate::provider::SourceAdapter;

pub const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co";
pub const SOURCE_NAME: &str = "alpha_vantage";
pub const CREDENTIAL_ENV: &str = "ALPHA_VANTAGE_API_KEY";

/// GLOBAL_QUOTE response
#[derive(Debug, Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GlobalQuote {
    #[serde(rename = "05. price")]
    price: Option<String>,
    #[serde(rename = "07. latest trading day")]
    latest_trading_day: Option<String>,
    #[serde(rename = "08. previous close")]
    previous_close: Option<String>,
    #[serde(rename = "10. change percent")]
    change_percent: Option<String>,
}

/// Alpha Vantage adapter.
pub struct AlphaVantageAdapter {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AlphaVantageAdapter {
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

    /// Check for API-level errors carried in a 200 body.
    fn check_api_error(response: &GlobalQuoteResponse, symbol: &str) -> Result<(), MarketDataError> {
        if let Some(ref msg) = response.error_message {
            debug!("Alpha Vantage error message for {}: {}", symbol, msg);
            return Err(MarketDataError::SymbolNotFound {
                source_name: SOURCE_NAME.to_string(),
                symbol: symbol.to_string(),
            });
        }

        // "Note" is the per-minute frequency notice
        if let Some(ref msg) = response.note {
            warn!("Alpha Vantage note: {}", msg);
            return Err(MarketDataError::RateLimited {
                source_name: SOURCE_NAME.to_string(),
            });
        }

        // "Information" is either a bad key or the daily quota
        if let Some(ref msg) = response.information {
            warn!("Alpha Vantage info: {}", msg);
            if msg.to_ascii_lowercase().contains("apikey") {
                return Err(MarketDataError::Unauthorized {
                    source_name: SOURCE_NAME.to_string(),
                });
            }
            return Err(MarketDataError::RateLimited {
                source_name: SOURCE_NAME.to_string(),
            });
        }

        Ok(())
    }

    /// Parse a decimal value, tolerating a trailing `%`.
    fn parse_decimal(s: &str) -> Option<Decimal> {
        Decimal::from_str(s.trim().trim_end_matches('%')).ok()
    }

    fn parse_reading(&self, symbol: &str, body: &str) -> Result<Reading, MarketDataError> {
        let response: GlobalQuoteResponse = http::parse_json(SOURCE_NAME, body)?;
        Self::check_api_error(&response, symbol)?;

        let not_found = || MarketDataError::SymbolNotFound {
            source_name: SOURCE_NAME.to_string(),
            symbol: symbol.to_string(),
        };

        let quote = response.global_quote.ok_or_else(not_found)?;
        let raw_price = quote.price.as_deref().ok_or_else(not_found)?;

        let malformed = |field: &str, value: &str| MarketDataError::MalformedResponse {
            source_name: SOURCE_NAME.to_string(),
            message: format!("Invalid {}: {}", field, value),
        };

        let price = Self::parse_decimal(raw_price).ok_or_else(|| malformed("price", raw_price))?;

        let change_percent = match quote.change_percent.as_deref() {
            Some(raw) => Self::parse_decimal(raw).ok_or_else(|| malformed("change percent", raw))?,
            None => {
                let raw = quote
                    .previous_close
                    .as_deref()
                    .ok_or_else(|| malformed("previous close", "<missing>"))?;
                let previous =
                    Self::parse_decimal(raw).ok_or_else(|| malformed("previous close", raw))?;
                http::percent_change(price, previous)
                    .ok_or_else(|| malformed("previous close", raw))?
            }
        };

        let timestamp = quote
            .latest_trading_day
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .and_then(|dt| Utc.from_local_datetime(&dt).single())
            .unwrap_or_else(Utc::now);

        Ok(Reading::new(symbol, price, change_percent, timestamp, SOURCE_NAME))
    }
}

#[async_trait]
impl SourceAdapter for AlphaVantageAdapter {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch(&self, symbol: &str) -> Result<Reading, MarketDataError> {
        let url = format!("{}/query", self.base_url);
        debug!("Alpha Vantage request: GLOBAL_QUOTE for {}", symbol);

        let request = self.client.get(&url).query(&[
            ("function", "GLOBAL_QUOTE"),
            ("symbol", symbol),
            ("apikey", self.api_key.as_str()),
        ]);
        let body = http::send_for_text(request, SOURCE_NAME, symbol).await?;

        self.parse_reading(symbol, &body)
    }
}
