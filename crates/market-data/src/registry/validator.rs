//! Reading validation.
//!
//! Sanity checks applied to every reading before it may contribute to a
//! consensus:
//! - Price must be strictly positive and below a sanity ceiling
//! - Change percent can never fall below -100%
//! - Implausibly large moves and stale or future timestamps are logged
//!
//! A hard failure rejects the reading and counts against the source's
//! circuit; soft issues are logged and the reading is kept.

use chrono::{Duration as ChronoDuration, Utc};
use log::warn;
use rust_decimal::Decimal;

use crate::errors::MarketDataError;
use crate::models::Reading;

/// Validation severity levels.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationSeverity {
    /// Hard failure - reject reading, source counts as failed.
    Hard,
    /// Soft warning - accept reading but log warning.
    Soft,
}

/// Validation result details.
#[derive(Clone, Debug)]
pub struct ValidationIssue {
    pub severity: ValidationSeverity,
    pub message: String,
}

/// Reading validator configuration.
#[derive(Clone, Debug)]
pub struct ValidatorConfig {
    /// Maximum allowed price value (for sanity check).
    pub max_price: Option<Decimal>,
    /// Absolute percent change above which a warning is logged.
    pub warn_change_percent: Decimal,
    /// Readings older than this are logged as stale.
    pub max_staleness: Option<ChronoDuration>,
    /// Readings further in the future than this are logged.
    pub max_future_skew: ChronoDuration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_price: Some(Decimal::from(1_000_000_000i64)),
            warn_change_percent: Decimal::from(50),
            // Weekend FX and index closes are legitimately old
            max_staleness: Some(ChronoDuration::days(4)),
            max_future_skew: ChronoDuration::minutes(5),
        }
    }
}

/// Reading validator.
#[derive(Clone, Debug, Default)]
pub struct ReadingValidator {
    config: ValidatorConfig,
}

impl ReadingValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Validate a reading.
    ///
    /// Returns `ValidationFailed` listing every hard issue. Soft issues are
    /// logged but do not cause rejection.
    pub fn validate(&self, reading: &Reading) -> Result<(), MarketDataError> {
        let issues = self.issues(reading);

        let errors: Vec<&str> = issues
            .iter()
            .filter(|i| i.severity == ValidationSeverity::Hard)
            .map(|i| i.message.as_str())
            .collect();

        if !errors.is_empty() {
            return Err(MarketDataError::ValidationFailed {
                source_name: reading.source_name.clone(),
                message: errors.join("; "),
            });
        }

        for issue in issues.iter().filter(|i| i.severity == ValidationSeverity::Soft) {
            warn!(
                "Reading validation warning for {} from '{}': {}",
                reading.symbol, reading.source_name, issue.message
            );
        }

        Ok(())
    }

    /// Collect every issue found in a reading.
    pub fn issues(&self, reading: &Reading) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        self.validate_price(reading, &mut issues);
        self.validate_change(reading, &mut issues);
        self.validate_timestamp(reading, &mut issues);
        issues
    }

    fn validate_price(&self, reading: &Reading, issues: &mut Vec<ValidationIssue>) {
        if reading.price <= Decimal::ZERO {
            issues.push(ValidationIssue {
                severity: ValidationSeverity::Hard,
                message: format!("Non-positive price: {}", reading.price),
            });
        }

        if let Some(max_price) = self.config.max_price {
            if reading.price > max_price {
                issues.push(ValidationIssue {
                    severity: ValidationSeverity::Hard,
                    message: format!(
                        "Price {} exceeds sanity limit {}",
                        reading.price, max_price
                    ),
                });
            }
        }
    }

    fn validate_change(&self, reading: &Reading, issues: &mut Vec<ValidationIssue>) {
        if reading.change_percent < Decimal::from(-100) {
            issues.push(ValidationIssue {
                severity: ValidationSeverity::Hard,
                message: format!("Change percent below -100%: {}", reading.change_percent),
            });
        } else if reading.change_percent.abs() > self.config.warn_change_percent {
            issues.push(ValidationIssue {
                severity: ValidationSeverity::Soft,
                message: format!("Unusually large move: {}%", reading.change_percent),
            });
        }
    }

    fn validate_timestamp(&self, reading: &Reading, issues: &mut Vec<ValidationIssue>) {
        let now = Utc::now();

        if reading.timestamp - now > self.config.max_future_skew {
            issues.push(ValidationIssue {
                severity: ValidationSeverity::Soft,
                message: format!("Timestamp {} is in the future", reading.timestamp),
            });
        }

        if let Some(max_staleness) = self.config.max_staleness {
            if now - reading.timestamp > max_staleness {
                issues.push(ValidationIssue {
                    severity: ValidationSeverity::Soft,
                    message: format!("Stale reading from {}", reading.timestamp),
                });
            }
        }
    }
}
