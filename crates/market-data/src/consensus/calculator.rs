//! Consensus arithmetic.
//!
//! Pure functions over a set of weighted readings: weighted mean, weighted
//! median, outlier flagging and the confidence/quality labels. No I/O and no
//! clock, so every rule here is unit-testable in isolation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::errors::MarketDataError;
use crate::models::{Confidence, ConsensusResult, Quality, Reading};

/// Default outlier threshold in percentage points of change.
pub const DEFAULT_OUTLIER_THRESHOLD_PERCENT: Decimal = dec!(5.0);

/// Default number of contributing sources required for HIGH confidence.
pub const DEFAULT_MIN_SOURCES_FOR_HIGH_CONFIDENCE: usize = 3;

/// What to do with a flagged outlier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlierPolicy {
    /// Keep it in the weighted mean and report it.
    #[default]
    Flag,
    /// Drop it from the weighted mean but still report it.
    Exclude,
}

/// What a reading's change is compared against when flagging outliers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlierReference {
    /// Weighted median of contributing changes. One wild source cannot
    /// drag the reference far enough to hide itself.
    #[default]
    Median,
    /// Weighted mean of contributing changes (the consensus itself).
    Mean,
}

/// Tunables for one consensus computation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsensusConfig {
    pub outlier_threshold_percent: Decimal,
    pub min_sources_for_high_confidence: usize,
    pub outlier_policy: OutlierPolicy,
    pub outlier_reference: OutlierReference,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            outlier_threshold_percent: DEFAULT_OUTLIER_THRESHOLD_PERCENT,
            min_sources_for_high_confidence: DEFAULT_MIN_SOURCES_FOR_HIGH_CONFIDENCE,
            outlier_policy: OutlierPolicy::default(),
            outlier_reference: OutlierReference::default(),
        }
    }
}

impl ConsensusConfig {
    pub fn validate(&self) -> Result<(), MarketDataError> {
        if self.outlier_threshold_percent.is_sign_negative() {
            return Err(MarketDataError::Config(format!(
                "outlier threshold must not be negative, got {}",
                self.outlier_threshold_percent
            )));
        }
        if self.min_sources_for_high_confidence == 0 {
            return Err(MarketDataError::Config(
                "minSourcesForHighConfidence must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// A successful reading paired with its source's configured weight.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightedReading {
    pub reading: Reading,
    pub weight: Decimal,
}

impl WeightedReading {
    pub fn new(reading: Reading, weight: f64) -> Result<Self, MarketDataError> {
        let weight = Decimal::try_from(weight)
            .ok()
            .filter(|w| *w > Decimal::ZERO)
            .ok_or_else(|| {
                MarketDataError::Config(format!(
                    "source '{}' has unusable weight {}",
                    reading.source_name, weight
                ))
            })?;
        Ok(Self { reading, weight })
    }

    pub fn source_name(&self) -> &str {
        &self.reading.source_name
    }
}

/// Weighted arithmetic mean of `(value, weight)` pairs, clamped to the
/// range of the values so rounding can never leave their convex hull.
///
/// Returns `None` for an empty input, zero total weight, or when the
/// weighted sum does not fit in a `Decimal`.
pub fn weighted_mean(values: &[(Decimal, Decimal)]) -> Option<Decimal> {
    let total_weight = total_weight(values)?;
    if total_weight <= Decimal::ZERO {
        return None;
    }

    let weighted_sum = values
        .iter()
        .try_fold(Decimal::ZERO, |acc, (v, w)| acc.checked_add(v.checked_mul(*w)?))?;
    let mean = weighted_sum.checked_div(total_weight)?;

    let min = values.iter().map(|(v, _)| *v).min()?;
    let max = values.iter().map(|(v, _)| *v).max()?;
    Some(mean.clamp(min, max).normalize())
}

/// Weighted median of `(value, weight)` pairs.
///
/// The smallest value at which the cumulative weight reaches half the total.
/// When the cumulative weight lands exactly on the half, the midpoint with
/// the next value is used, so two equal-weight values give their average.
pub fn weighted_median(values: &[(Decimal, Decimal)]) -> Option<Decimal> {
    let total_weight = total_weight(values)?;
    if values.is_empty() || total_weight <= Decimal::ZERO {
        return None;
    }

    let mut sorted: Vec<(Decimal, Decimal)> = values.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let half = total_weight / Decimal::TWO;
    let mut cumulative = Decimal::ZERO;
    for (i, (value, weight)) in sorted.iter().enumerate() {
        cumulative = cumulative.checked_add(*weight)?;
        if cumulative == half {
            let next = sorted.get(i + 1).map(|(v, _)| *v).unwrap_or(*value);
            let midpoint = (*value / Decimal::TWO).checked_add(next / Decimal::TWO)?;
            return Some(midpoint.normalize());
        }
        if cumulative > half {
            return Some(value.normalize());
        }
    }
    sorted.last().map(|(v, _)| v.normalize())
}

fn total_weight(values: &[(Decimal, Decimal)]) -> Option<Decimal> {
    values
        .iter()
        .try_fold(Decimal::ZERO, |acc, (_, w)| acc.checked_add(*w))
}

/// Names of readings whose change deviates from `reference` by strictly
/// more than `threshold` percentage points, sorted.
pub fn find_outliers(readings: &[WeightedReading], reference: Decimal, threshold: Decimal) -> Vec<String> {
    let mut outliers: Vec<String> = readings
        .iter()
        .filter(|r| {
            r.reading
                .change_percent
                .checked_sub(reference)
                .map_or(true, |deviation| deviation.abs() > threshold)
        })
        .map(|r| r.source_name().to_string())
        .collect();
    outliers.sort();
    outliers
}

/// Confidence label for a round.
///
/// - LOW: a single contributor, whatever `min_for_high` says
/// - HIGH: at least `min_for_high` contributors and no outliers
/// - MEDIUM: everything else
pub fn classify_confidence(contributing: usize, outliers: usize, min_for_high: usize) -> Confidence {
    if contributing <= 1 {
        Confidence::Low
    } else if contributing >= min_for_high && outliers == 0 {
        Confidence::High
    } else {
        Confidence::Medium
    }
}

/// Quality label for a live round.
pub fn classify_quality(contributing: usize, enabled: usize) -> Quality {
    if contributing > 0 && contributing >= enabled {
        Quality::Full
    } else {
        Quality::Partial
    }
}

/// Reconcile readings into one live result.
///
/// `enabled_sources` is the number of sources that were eligible this round
/// and decides FULL versus PARTIAL. Zero readings is `ConsensusUnavailable`.
pub fn compute(
    symbol: &str,
    readings: &[WeightedReading],
    enabled_sources: usize,
    config: &ConsensusConfig,
    now: DateTime<Utc>,
) -> Result<ConsensusResult, MarketDataError> {
    if readings.is_empty() {
        return Err(MarketDataError::ConsensusUnavailable {
            symbol: symbol.to_string(),
            detail: "no source produced a reading".to_string(),
        });
    }

    let changes: Vec<(Decimal, Decimal)> = readings
        .iter()
        .map(|r| (r.reading.change_percent, r.weight))
        .collect();

    let reference = match config.outlier_reference {
        OutlierReference::Median => weighted_median(&changes),
        OutlierReference::Mean => weighted_mean(&changes),
    }
    .ok_or_else(|| unavailable(symbol))?;

    let outlier_sources = find_outliers(readings, reference, config.outlier_threshold_percent);

    let averaged: Vec<&WeightedReading> = match config.outlier_policy {
        OutlierPolicy::Flag => readings.iter().collect(),
        OutlierPolicy::Exclude => {
            let kept: Vec<&WeightedReading> = readings
                .iter()
                .filter(|r| !outlier_sources.iter().any(|o| o == r.source_name()))
                .collect();
            // Everything flagged means there is no majority to trust more
            if kept.is_empty() {
                readings.iter().collect()
            } else {
                kept
            }
        }
    };

    let prices: Vec<(Decimal, Decimal)> = averaged
        .iter()
        .map(|r| (r.reading.price, r.weight))
        .collect();
    let changes: Vec<(Decimal, Decimal)> = averaged
        .iter()
        .map(|r| (r.reading.change_percent, r.weight))
        .collect();

    let consensus_price = weighted_mean(&prices).ok_or_else(|| unavailable(symbol))?;
    let consensus_change = weighted_mean(&changes).ok_or_else(|| unavailable(symbol))?;

    let mut sources_used: Vec<String> = readings.iter().map(|r| r.source_name().to_string()).collect();
    sources_used.sort();

    let confidence = classify_confidence(
        readings.len(),
        outlier_sources.len(),
        config.min_sources_for_high_confidence,
    );
    let quality = classify_quality(readings.len(), enabled_sources);

    Ok(ConsensusResult {
        symbol: symbol.to_string(),
        consensus_price: Some(consensus_price),
        consensus_change_percent: Some(consensus_change),
        sources_used,
        outlier_sources,
        confidence,
        quality,
        as_of: now,
        age_secs: None,
        unavailable_reason: None,
    })
}

fn unavailable(symbol: &str) -> MarketDataError {
    MarketDataError::ConsensusUnavailable {
        symbol: symbol.to_string(),
        detail: "readings carry no usable weight or overflow the decimal range".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(source: &str, price: Decimal, change: Decimal, weight: f64) -> WeightedReading {
        WeightedReading::new(Reading::new("TEST", price, change, Utc::now(), source), weight).unwrap()
    }

    fn compute_default(readings: &[WeightedReading], enabled: usize) -> ConsensusResult {
        compute("TEST", readings, enabled, &ConsensusConfig::default(), Utc::now()).unwrap()
    }

    #[test]
    fn test_equal_weights_exact_mean() {
        let readings = vec![
            reading("a", dec!(100), dec!(0), 1.0),
            reading("b", dec!(110), dec!(0), 1.0),
        ];
        let result = compute_default(&readings, 2);
        assert_eq!(result.consensus_price, Some(dec!(105)));
        assert_eq!(result.quality, Quality::Full);
        assert_eq!(result.confidence, Confidence::Medium);
    }

    #[test]
    fn test_flags_only_the_wild_change() {
        let readings = vec![
            reading("a", dec!(100), dec!(1.0), 1.0),
            reading("b", dec!(100), dec!(1.2), 1.0),
            reading("c", dec!(100), dec!(8.0), 1.0),
        ];
        let result = compute_default(&readings, 3);
        assert_eq!(result.outlier_sources, vec!["c".to_string()]);
        assert_eq!(result.confidence, Confidence::Medium);
        // Outliers still count toward the mean under the default policy
        assert_eq!(result.consensus_change_percent, Some(dec!(3.4)));
        assert_eq!(result.sources_used, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_weighted_scenario_with_negative_outlier() {
        let readings = vec![
            reading("A", dec!(50), dec!(2.0), 1.5),
            reading("B", dec!(50), dec!(2.4), 1.5),
            reading("C", dec!(50), dec!(-6.0), 1.0),
        ];
        let result = compute_default(&readings, 3);
        // (1.5*2.0 + 1.5*2.4 + 1.0*-6.0) / 4.0
        assert_eq!(result.consensus_change_percent, Some(dec!(0.15)));
        assert_eq!(result.outlier_sources, vec!["C".to_string()]);
        assert_eq!(result.confidence, Confidence::Medium);
    }

    #[test]
    fn test_three_agreeing_sources_is_high() {
        let readings = vec![
            reading("a", dec!(100), dec!(1.0), 1.0),
            reading("b", dec!(101), dec!(1.1), 1.0),
            reading("c", dec!(99), dec!(0.9), 1.0),
        ];
        let result = compute_default(&readings, 3);
        assert_eq!(result.confidence, Confidence::High);
        assert!(result.outlier_sources.is_empty());
        assert_eq!(result.consensus_price, Some(dec!(100)));
    }

    #[test]
    fn test_single_source_is_low_and_partial() {
        let readings = vec![reading("a", dec!(42), dec!(0.5), 1.0)];
        let result = compute_default(&readings, 3);
        assert_eq!(result.confidence, Confidence::Low);
        assert_eq!(result.quality, Quality::Partial);
        assert_eq!(result.consensus_price, Some(dec!(42)));
    }

    #[test]
    fn test_zero_readings_is_unavailable() {
        let result = compute("TEST", &[], 3, &ConsensusConfig::default(), Utc::now());
        assert!(matches!(
            result,
            Err(MarketDataError::ConsensusUnavailable { .. })
        ));
    }

    #[test]
    fn test_threshold_is_strict() {
        let readings = vec![
            reading("a", dec!(100), dec!(0), 1.0),
            reading("b", dec!(100), dec!(0), 1.0),
            reading("c", dec!(100), dec!(5), 1.0),
        ];
        // Deviation is exactly 5 from the median of 0: not an outlier
        let result = compute_default(&readings, 3);
        assert!(result.outlier_sources.is_empty());
    }

    #[test]
    fn test_exclude_policy_drops_outlier_from_mean() {
        let config = ConsensusConfig {
            outlier_policy: OutlierPolicy::Exclude,
            ..Default::default()
        };
        let readings = vec![
            reading("a", dec!(100), dec!(1.0), 1.0),
            reading("b", dec!(102), dec!(1.2), 1.0),
            reading("c", dec!(180), dec!(8.0), 1.0),
        ];
        let result = compute("TEST", &readings, 3, &config, Utc::now()).unwrap();
        assert_eq!(result.consensus_price, Some(dec!(101)));
        assert_eq!(result.consensus_change_percent, Some(dec!(1.1)));
        assert_eq!(result.outlier_sources, vec!["c".to_string()]);
        assert_eq!(result.sources_used.len(), 3);
    }

    #[test]
    fn test_mean_reference_can_hide_a_wild_source() {
        let config = ConsensusConfig {
            outlier_reference: OutlierReference::Mean,
            ..Default::default()
        };
        let readings = vec![
            reading("a", dec!(100), dec!(1.0), 1.0),
            reading("b", dec!(100), dec!(1.2), 1.0),
            reading("c", dec!(100), dec!(8.0), 1.0),
        ];
        // Mean is 3.4; c deviates by 4.6 which is under the threshold
        let result = compute("TEST", &readings, 3, &config, Utc::now()).unwrap();
        assert!(result.outlier_sources.is_empty());
        assert_eq!(result.confidence, Confidence::High);
    }

    #[test]
    fn test_weighted_median() {
        assert_eq!(weighted_median(&[]), None);
        assert_eq!(
            weighted_median(&[(dec!(1), dec!(1)), (dec!(1.2), dec!(1)), (dec!(8), dec!(1))]),
            Some(dec!(1.2))
        );
        // Exactly half on each side: midpoint
        assert_eq!(
            weighted_median(&[(dec!(100), dec!(1)), (dec!(110), dec!(1))]),
            Some(dec!(105))
        );
        // Heavy weight pulls the median
        assert_eq!(
            weighted_median(&[(dec!(1), dec!(5)), (dec!(2), dec!(1)), (dec!(3), dec!(1))]),
            Some(dec!(1))
        );
    }

    #[test]
    fn test_weighted_mean_stays_in_hull() {
        let values = [(dec!(1), dec!(1)), (dec!(2), dec!(1)), (dec!(2), dec!(1))];
        let mean = weighted_mean(&values).unwrap();
        assert!(mean >= dec!(1) && mean <= dec!(2));
        assert_eq!(weighted_mean(&[]), None);
    }

    #[test]
    fn test_huge_weights_are_unavailable_not_a_panic() {
        let readings = vec![
            reading("a", dec!(900000000), dec!(1.0), 1e25),
            reading("b", dec!(900000000), dec!(1.1), 1e25),
        ];
        let result = compute("TEST", &readings, 2, &ConsensusConfig::default(), Utc::now());
        assert!(matches!(
            result,
            Err(MarketDataError::ConsensusUnavailable { .. })
        ));

        assert_eq!(weighted_mean(&[(Decimal::MAX, dec!(2))]), None);
        assert_eq!(weighted_median(&[(dec!(1), Decimal::MAX), (dec!(2), Decimal::MAX)]), None);
    }

    #[test]
    fn test_classify_confidence_table() {
        assert_eq!(classify_confidence(3, 0, 3), Confidence::High);
        assert_eq!(classify_confidence(5, 0, 3), Confidence::High);
        assert_eq!(classify_confidence(3, 1, 3), Confidence::Medium);
        assert_eq!(classify_confidence(2, 0, 3), Confidence::Medium);
        assert_eq!(classify_confidence(1, 0, 3), Confidence::Low);
        assert_eq!(classify_confidence(2, 0, 2), Confidence::High);
        assert_eq!(classify_confidence(1, 0, 1), Confidence::Low);
        assert_eq!(classify_confidence(2, 0, 1), Confidence::High);
    }

    #[test]
    fn test_classify_quality() {
        assert_eq!(classify_quality(3, 3), Quality::Full);
        assert_eq!(classify_quality(2, 3), Quality::Partial);
        assert_eq!(classify_quality(0, 0), Quality::Partial);
    }

    #[test]
    fn test_rejects_bad_weights() {
        let r = Reading::new("TEST", dec!(1), dec!(0), Utc::now(), "a");
        assert!(WeightedReading::new(r.clone(), 0.0).is_err());
        assert!(WeightedReading::new(r.clone(), -1.0).is_err());
        assert!(WeightedReading::new(r, f64::NAN).is_err());
    }

    #[test]
    fn test_config_validation() {
        assert!(ConsensusConfig::default().validate().is_ok());
        let negative = ConsensusConfig {
            outlier_threshold_percent: dec!(-1),
            ..Default::default()
        };
        assert!(negative.validate().is_err());
        let zero_min = ConsensusConfig {
            min_sources_for_high_confidence: 0,
            ..Default::default()
        };
        assert!(zero_min.validate().is_err());
    }
}
