//! Retry executor for guarded source calls.
//!
//! Each attempt is a full guarded call: take a rate-limit token, take a
//! circuit-breaker permit, then call the adapter under the per-attempt
//! timeout. Transient failures are retried with exponential backoff plus a
//! bounded random jitter. Skips (`CircuitOpen`, `RateLimitExhausted`) and
//! terminal errors end the loop at once.

use std::time::Duration;

use log::{debug, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::{MarketDataError, RetryClass};
use crate::models::source::duration_secs;
use crate::models::Reading;

use super::source_registry::SourceEntry;
use super::validator::ReadingValidator;

/// Retry policy for one source call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles after each retry.
    #[serde(rename = "baseDelaySecs", with = "duration_secs")]
    pub base_delay: Duration,
    /// Upper bound of the uniform jitter added to every delay.
    #[serde(rename = "maxJitterSecs", with = "duration_secs")]
    pub max_jitter: Duration,
    /// Timeout applied to each adapter call.
    #[serde(rename = "attemptTimeoutSecs", with = "duration_secs")]
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::from_millis(500),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay (without jitter) slept after the given failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Worst-case wall time for one source including all attempts and
    /// backoffs at maximum jitter.
    pub fn max_elapsed(&self) -> Duration {
        let attempts = self.max_attempts.max(1);
        let mut total = self.attempt_timeout.saturating_mul(attempts);
        for attempt in 1..attempts {
            total = total
                .saturating_add(self.backoff_for(attempt))
                .saturating_add(self.max_jitter);
        }
        total
    }

    fn jitter(&self) -> Duration {
        let max_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

/// Outcome of a retried call, with what it cost.
#[derive(Debug)]
pub struct RetryOutcome {
    pub result: Result<Reading, MarketDataError>,
    /// Attempts that reached the guard (skips count as one).
    pub attempts: u32,
    /// Total time slept between attempts.
    pub backoff: Duration,
}

/// Runs guarded, retried calls against a registry entry.
#[derive(Clone, Debug, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    validator: ReadingValidator,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            validator: ReadingValidator::default(),
        }
    }

    pub fn with_validator(mut self, validator: ReadingValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch `symbol` from one source, retrying transient failures.
    pub async fn execute(&self, entry: &SourceEntry, symbol: &str) -> RetryOutcome {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut backoff = Duration::ZERO;
        let mut attempt = 0;
        let mut last_provider_error: Option<MarketDataError> = None;

        loop {
            attempt += 1;
            let result = self.guarded_call(entry, symbol).await;

            let error = match result {
                Ok(reading) => {
                    debug!(
                        "Retry: '{}' answered {} on attempt {}",
                        entry.name(),
                        symbol,
                        attempt
                    );
                    return RetryOutcome {
                        result: Ok(reading),
                        attempts: attempt,
                        backoff,
                    };
                }
                Err(e) => e,
            };

            // A guard refusing a retry is not the source's answer; keep the fault that caused the retry
            let error = match (error.retry_class(), last_provider_error.take()) {
                (RetryClass::Unavailable, Some(previous)) => {
                    debug!(
                        "Retry: '{}' refused attempt {} ({}), reporting earlier failure",
                        entry.name(),
                        attempt,
                        error
                    );
                    return RetryOutcome {
                        result: Err(previous),
                        attempts: attempt,
                        backoff,
                    };
                }
                _ => error,
            };

            if !error.is_retryable() || attempt >= max_attempts {
                if error.is_retryable() {
                    warn!(
                        "Retry: giving up on '{}' for {} after {} attempts: {}",
                        entry.name(),
                        symbol,
                        attempt,
                        error
                    );
                }
                return RetryOutcome {
                    result: Err(error),
                    attempts: attempt,
                    backoff,
                };
            }

            let delay = self.policy.backoff_for(attempt) + self.policy.jitter();
            debug!(
                "Retry: attempt {} for '{}' failed ({}), retrying in {:?}",
                attempt,
                entry.name(),
                error,
                delay
            );
            tokio::time::sleep(delay).await;
            backoff += delay;
            last_provider_error = Some(error);
        }
    }

    /// Rate limiter -> circuit breaker -> adapter, once.
    async fn guarded_call(&self, entry: &SourceEntry, symbol: &str) -> Result<Reading, MarketDataError> {
        if !entry.bucket().try_acquire() {
            return Err(MarketDataError::RateLimitExhausted {
                source_name: entry.name().to_string(),
            });
        }

        let permit = entry.breaker().try_acquire()?;

        let fetched = tokio::time::timeout(self.policy.attempt_timeout, entry.adapter().fetch(symbol))
            .await
            .unwrap_or_else(|_| {
                Err(MarketDataError::Timeout {
                    source_name: entry.name().to_string(),
                })
            });

        let result = fetched.and_then(|reading| {
            self.validator.validate(&reading)?;
            Ok(reading)
        });

        match &result {
            Ok(_) => permit.success(),
            Err(e) => match e.retry_class() {
                RetryClass::WithBackoff | RetryClass::FailWithPenalty => permit.failure(),
                RetryClass::Never | RetryClass::Unavailable => permit.neutral(),
            },
        }

        result
    }
}
