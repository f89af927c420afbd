//! HTTP plumbing shared by the adapters: client construction, transport
//! error mapping and status classification.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::errors::MarketDataError;

/// Transport timeout for adapter clients.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("quorum/", env!("CARGO_PKG_VERSION"));

pub(crate) fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|_| Client::new())
}

pub(crate) fn map_transport_error(source: &str, error: reqwest::Error) -> MarketDataError {
    if error.is_timeout() {
        MarketDataError::Timeout {
            source_name: source.to_string(),
        }
    } else {
        MarketDataError::Network {
            source_name: source.to_string(),
            message: error.to_string(),
        }
    }
}

/// Map a non-success HTTP status to the error taxonomy.
///
/// | Status | Error | Retryable |
/// |--------|-------|-----------|
/// | 404 | `SymbolNotFound` | no (no penalty) |
/// | 401, 403 | `Unauthorized` | no |
/// | 429 | `RateLimited` | yes |
/// | 5xx | `Upstream` | yes |
/// | other 4xx | `Upstream` | no |
pub(crate) fn classify_status(
    source: &str,
    symbol: &str,
    status: StatusCode,
    body: &str,
) -> MarketDataError {
    match status {
        StatusCode::NOT_FOUND => MarketDataError::SymbolNotFound {
            source_name: source.to_string(),
            symbol: symbol.to_string(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => MarketDataError::Unauthorized {
            source_name: source.to_string(),
        },
        StatusCode::TOO_MANY_REQUESTS => MarketDataError::RateLimited {
            source_name: source.to_string(),
        },
        _ => MarketDataError::Upstream {
            source_name: source.to_string(),
            status: status.as_u16(),
            message: truncate(body, 200),
        },
    }
}

/// Send a request and return the body of a successful response.
pub(crate) async fn send_for_text(
    request: RequestBuilder,
    source: &str,
    symbol: &str,
) -> Result<String, MarketDataError> {
    let response = request
        .send()
        .await
        .map_err(|e| map_transport_error(source, e))?;

    let status = response.status();
    debug!("{} responded HTTP {} for {}", source, status, symbol);

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_status(source, symbol, status, &body));
    }

    response
        .text()
        .await
        .map_err(|e| map_transport_error(source, e))
}

pub(crate) fn parse_json<T: DeserializeOwned>(source: &str, body: &str) -> Result<T, MarketDataError> {
    serde_json::from_str(body).map_err(|e| MarketDataError::MalformedResponse {
        source_name: source.to_string(),
        message: format!("Failed to parse response: {}", e),
    })
}

pub(crate) fn decimal_from_f64(source: &str, field: &str, value: f64) -> Result<Decimal, MarketDataError> {
    Decimal::try_from(value).map_err(|_| MarketDataError::MalformedResponse {
        source_name: source.to_string(),
        message: format!("Invalid {}: {}", field, value),
    })
}

/// Percent change from a previous close, rounded to 4 dp.
pub(crate) fn percent_change(price: Decimal, previous_close: Decimal) -> Option<Decimal> {
    if previous_close.is_zero() {
        return None;
    }
    let change = (price - previous_close) / previous_close * Decimal::ONE_HUNDRED;
    Some(change.round_dp(4))
}

fn truncate(body: &str, max_chars: usize) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= max_chars {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status("yahoo", "NOPE", StatusCode::NOT_FOUND, ""),
            MarketDataError::SymbolNotFound { .. }
        ));
        assert!(matches!(
            classify_status("yahoo", "AAPL", StatusCode::FORBIDDEN, ""),
            MarketDataError::Unauthorized { .. }
        ));

        let throttled = classify_status("yahoo", "AAPL", StatusCode::TOO_MANY_REQUESTS, "");
        assert!(throttled.is_retryable());

        let unavailable = classify_status("yahoo", "AAPL", StatusCode::SERVICE_UNAVAILABLE, "down");
        assert!(unavailable.is_retryable());
        assert_eq!(unavailable.status_hint(), Some(503));

        let bad_request = classify_status("yahoo", "AAPL", StatusCode::BAD_REQUEST, "nope");
        assert!(!bad_request.is_retryable());
        assert!(bad_request.retry_class().penalizes_circuit());
    }

    #[test]
    fn test_percent_change() {
        assert_eq!(percent_change(dec!(110), dec!(100)), Some(dec!(10)));
        assert_eq!(percent_change(dec!(99), dec!(100)), Some(dec!(-1)));
        assert_eq!(percent_change(dec!(1), dec!(3)), Some(dec!(-66.6667)));
        assert_eq!(percent_change(dec!(1), dec!(0)), None);
    }

    #[test]
    fn test_decimal_from_f64_rejects_nan() {
        assert_eq!(decimal_from_f64("x", "price", 1.5).unwrap(), dec!(1.5));
        assert!(matches!(
            decimal_from_f64("x", "price", f64::NAN),
            Err(MarketDataError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_truncate_long_bodies() {
        let body = "x".repeat(300);
        let message = truncate(&body, 200);
        assert_eq!(message.len(), 203);
        assert!(message.ends_with("..."));
        assert_eq!(truncate("  short  ", 200), "short");
    }
}
