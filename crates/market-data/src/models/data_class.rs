use serde::{Deserialize, Serialize};

/// Volatility indices quoted with a `^` prefix.
const VOLATILITY_INDICES: &[&str] = &["^VIX", "^VXN", "^VVIX", "^VIX3M", "^VIX9D", "^MOVE", "^OVX", "^GVZ"];

/// Broad class of a reading, used to pick a cache TTL.
///
/// Inferred from symbol conventions:
/// - `EURUSD=X` style symbols are FX reference rates
/// - `^VIX` family symbols are volatility readings
/// - other `^` symbols are index levels
/// - everything else is a live quote
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataClass {
    Quote,
    Index,
    Volatility,
    FxRate,
}

impl DataClass {
    pub fn classify(symbol: &str) -> Self {
        let symbol = symbol.trim();
        if symbol.ends_with("=X") {
            Self::FxRate
        } else if VOLATILITY_INDICES
            .iter()
            .any(|v| v.eq_ignore_ascii_case(symbol))
        {
            Self::Volatility
        } else if symbol.starts_with('^') {
            Self::Index
        } else {
            Self::Quote
        }
    }
}
