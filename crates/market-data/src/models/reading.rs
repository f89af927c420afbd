use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One source's normalized answer for one symbol.
///
/// Created by a source adapter on every successful call and consumed
/// immediately by the aggregator. Never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    /// Canonical (upper-cased) symbol the caller asked for
    pub symbol: String,

    /// Last price / index level / volatility reading
    pub price: Decimal,

    /// Percent change versus the previous close (1.5 = +1.5%)
    pub change_percent: Decimal,

    /// Provider-reported observation time
    pub timestamp: DateTime<Utc>,

    /// Name of the source that produced the reading
    pub source_name: String,
}

impl Reading {
    pub fn new(
        symbol: impl Into<String>,
        price: Decimal,
        change_percent: Decimal,
        timestamp: DateTime<Utc>,
        source_name: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            change_percent,
            timestamp,
            source_name: source_name.into(),
        }
    }
}
