//! Yahoo Finance API response models.
//!
//! These models parse the v8 chart endpoint, which carries the latest
//! regular-market price and the previous close in its `meta` block.

use serde::Deserialize;

/// Main response wrapper for the chart API
#[derive(Debug, Deserialize)]
pub struct YahooChartResponse {
    pub chart: YahooChart,
}

#[derive(Debug, Deserialize)]
pub struct YahooChart {
    pub result: Option<Vec<YahooChartResult>>,
    pub error: Option<YahooChartError>,
}

#[derive(Debug, Deserialize)]
pub struct YahooChartResult {
    pub meta: YahooChartMeta,
    // Note: timestamp and indicators exist but the meta block is enough
}

/// Latest-trade metadata for the symbol
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooChartMeta {
    pub regular_market_price: Option<f64>,
    pub regular_market_time: Option<i64>,
    pub previous_close: Option<f64>,
    pub chart_previous_close: Option<f64>,
}

impl YahooChartMeta {
    /// Previous close, preferring the session close over the chart baseline.
    pub fn reference_close(&self) -> Option<f64> {
        self.previous_close.or(self.chart_previous_close)
    }
}

#[derive(Debug, Deserialize)]
pub struct YahooChartError {
    pub code: Option<String>,
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_chart_meta() {
        let json = r#"{
            "chart": {
                "result": [{
                    "meta": {
                        "currency": "USD",
                        "symbol": "AAPL",
                        "regularMarketPrice": 189.5,
                        "regularMarketTime": 1700000000,
                        "chartPreviousClose": 187.0
                    },
                    "timestamp": [1700000000]
                }],
                "error": null
            }
        }"#;
        let response: YahooChartResponse = serde_json::from_str(json).unwrap();
        let results = response.chart.result.unwrap();
        let meta = &results[0].meta;
        assert_eq!(meta.regular_market_price, Some(189.5));
        assert_eq!(meta.reference_close(), Some(187.0));
        assert!(response.chart.error.is_none());
    }

    #[test]
    fn test_deserialize_chart_error() {
        let json = r#"{
            "chart": {
                "result": null,
                "error": { "code": "Not Found", "description": "No data found, symbol may be delisted" }
            }
        }"#;
        let response: YahooChartResponse = serde_json::from_str(json).unwrap();
        assert!(response.chart.result.is_none());
        assert_eq!(
            response.chart.error.unwrap().code.as_deref(),
            Some("Not Found")
        );
    }
}
