//! Per-round diagnostics: what happened to each source during one consensus round.

use std::fmt;

use crate::errors::MarketDataError;
use crate::models::SourceName;

/// Why a source was not called at all during a round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Source is disabled in configuration.
    Disabled,

    /// Source needs an API key that was not supplied.
    MissingCredential,

    /// Circuit breaker is open for this source.
    CircuitOpen,

    /// The source's token bucket was empty.
    RateLimited,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::MissingCredential => write!(f, "missing credential"),
            Self::CircuitOpen => write!(f, "circuit open"),
            Self::RateLimited => write!(f, "rate limited"),
        }
    }
}

/// Final state of one source in a round.
#[derive(Clone, Debug, PartialEq)]
pub enum SourceOutcome {
    /// The source's reading went into the consensus.
    Contributed { attempts: u32 },

    /// The source was intentionally not called (no breaker penalty).
    Skipped(SkipReason),

    /// Every attempt failed; the last error is kept.
    Failed { error: MarketDataError, attempts: u32 },

    /// Still running at the round deadline and aborted (no breaker penalty).
    Cancelled,
}

impl SourceOutcome {
    /// Classify an executor error into a skip or a failure.
    pub fn from_error(error: MarketDataError, attempts: u32) -> Self {
        match error {
            MarketDataError::CircuitOpen { .. } => Self::Skipped(SkipReason::CircuitOpen),
            MarketDataError::RateLimitExhausted { .. } => Self::Skipped(SkipReason::RateLimited),
            error => Self::Failed { error, attempts },
        }
    }
}

impl fmt::Display for SourceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contributed { .. } => write!(f, "contributed"),
            Self::Skipped(reason) => write!(f, "{}", reason),
            Self::Failed { error, attempts } if *attempts > 1 => {
                write!(f, "{} after {} attempts", error, attempts)
            }
            Self::Failed { error, .. } => write!(f, "{}", error),
            Self::Cancelled => write!(f, "cancelled at round deadline"),
        }
    }
}

/// Record of a single source during a round.
#[derive(Clone, Debug)]
pub struct SourceAttempt {
    pub source_name: SourceName,
    pub outcome: SourceOutcome,
}

/// Detailed record of a consensus round.
#[derive(Clone, Debug, Default)]
pub struct RoundDiagnostics {
    pub attempts: Vec<SourceAttempt>,
}

impl RoundDiagnostics {
    pub fn new() -> Self {
        Self {
            attempts: Vec::new(),
        }
    }

    pub fn record(&mut self, source_name: impl Into<SourceName>, outcome: SourceOutcome) {
        self.attempts.push(SourceAttempt {
            source_name: source_name.into(),
            outcome,
        });
    }

    pub fn record_skip(&mut self, source_name: impl Into<SourceName>, reason: SkipReason) {
        self.record(source_name, SourceOutcome::Skipped(reason));
    }

    pub fn record_success(&mut self, source_name: impl Into<SourceName>, attempts: u32) {
        self.record(source_name, SourceOutcome::Contributed { attempts });
    }

    pub fn record_cancelled(&mut self, source_name: impl Into<SourceName>) {
        self.record(source_name, SourceOutcome::Cancelled);
    }

    /// Order attempts by source name so summaries are stable.
    pub fn sort(&mut self) {
        self.attempts.sort_by(|a, b| a.source_name.cmp(&b.source_name));
    }

    /// Summary for logging/debugging.
    pub fn summary(&self) -> String {
        self.attempts
            .iter()
            .map(|a| match &a.outcome {
                SourceOutcome::Contributed { .. } => format!("{}: SUCCESS", a.source_name),
                SourceOutcome::Skipped(reason) => format!("{}: SKIPPED ({})", a.source_name, reason),
                SourceOutcome::Failed { error, .. } => format!("{}: ERROR ({})", a.source_name, error),
                SourceOutcome::Cancelled => format!("{}: CANCELLED", a.source_name),
            })
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// Human-readable explanation of why sources did not contribute.
    pub fn unavailable_summary(&self) -> String {
        let parts: Vec<String> = self
            .attempts
            .iter()
            .filter(|a| !matches!(a.outcome, SourceOutcome::Contributed { .. }))
            .map(|a| format!("{}: {}", a.source_name, a.outcome))
            .collect();

        if parts.is_empty() {
            "no sources configured".to_string()
        } else {
            parts.join(", ")
        }
    }

    pub fn has_success(&self) -> bool {
        self.attempts
            .iter()
            .any(|a| matches!(a.outcome, SourceOutcome::Contributed { .. }))
    }

    pub fn outcome_for(&self, source_name: &str) -> Option<&SourceOutcome> {
        self.attempts
            .iter()
            .find(|a| a.source_name == source_name)
            .map(|a| &a.outcome)
    }

    pub fn skip_reasons(&self) -> Vec<(&SourceName, &SkipReason)> {
        self.attempts
            .iter()
            .filter_map(|a| match &a.outcome {
                SourceOutcome::Skipped(reason) => Some((&a.source_name, reason)),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<(&SourceName, &MarketDataError)> {
        self.attempts
            .iter()
            .filter_map(|a| match &a.outcome {
                SourceOutcome::Failed { error, .. } => Some((&a.source_name, error)),
                _ => None,
            })
            .collect()
    }

    pub fn cancelled(&self) -> Vec<&SourceName> {
        self.attempts
            .iter()
            .filter(|a| a.outcome == SourceOutcome::Cancelled)
            .map(|a| &a.source_name)
            .collect()
    }
}
