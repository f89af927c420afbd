use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How trustworthy a consensus value is, based on source count and agreement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// How fresh and complete a returned result is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Quality {
    /// Every enabled source contributed to a live round.
    Full,
    /// Some, but not all, enabled sources contributed.
    Partial,
    /// Live round failed; value served from the last-known-good cache.
    Cached,
    /// Nothing live and nothing cached. No numeric value.
    Degraded,
}

impl Quality {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Full | Self::Partial)
    }
}

/// The externally visible answer for one symbol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusResult {
    pub symbol: String,

    /// Weighted consensus price. `None` only when `quality` is `Degraded`.
    pub consensus_price: Option<Decimal>,

    /// Weighted consensus percent change. `None` only when `quality` is `Degraded`.
    pub consensus_change_percent: Option<Decimal>,

    /// Sources whose readings contributed
    pub sources_used: Vec<String>,

    /// Sources whose change percent deviated beyond the outlier threshold
    pub outlier_sources: Vec<String>,

    pub confidence: Confidence,

    pub quality: Quality,

    /// When the underlying readings were taken
    pub as_of: DateTime<Utc>,

    /// Age of a cached answer in seconds (set only for `Cached`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_secs: Option<i64>,

    /// Why no value could be produced (set only for `Degraded`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unavailable_reason: Option<String>,
}

impl ConsensusResult {
    /// Terminal answer carrying no numeric value.
    pub fn degraded(symbol: impl Into<String>, reason: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            consensus_price: None,
            consensus_change_percent: None,
            sources_used: Vec::new(),
            outlier_sources: Vec::new(),
            confidence: Confidence::Low,
            quality: Quality::Degraded,
            as_of: now,
            age_secs: None,
            unavailable_reason: Some(reason.into()),
        }
    }

    /// Re-labels a previously live result as served from cache.
    ///
    /// Numeric values, source lists, confidence and `as_of` are kept as they
    /// were when the result was cached.
    pub fn into_cached(self, age_secs: i64) -> Self {
        Self {
            quality: Quality::Cached,
            age_secs: Some(age_secs.max(0)),
            unavailable_reason: None,
            ..self
        }
    }

    pub fn has_value(&self) -> bool {
        self.consensus_price.is_some()
    }
}
