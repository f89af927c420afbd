//! Source registry module.
//!
//! This module provides the per-source guards used by every consensus round:
//! - Source registration, credential checks and priority ordering
//! - Rate limiting per source
//! - Circuit breaking for fault tolerance
//! - Retrying guarded calls with jittered backoff
//! - Reading validation and per-round diagnostics

mod circuit_breaker;
mod diagnostics;
mod rate_limiter;
mod retry;
mod source_registry;
mod validator;

pub use circuit_breaker::{
    CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitMetrics, CircuitState,
    DEFAULT_FAILURE_THRESHOLD, DEFAULT_OPEN_DURATION,
};
pub use diagnostics::{RoundDiagnostics, SkipReason, SourceAttempt, SourceOutcome};
pub use rate_limiter::TokenBucket;
pub use retry::{RetryExecutor, RetryOutcome, RetryPolicy};
pub use source_registry::{env_credential, SourceEntry, SourceRegistry};
pub use validator::{ReadingValidator, ValidationIssue, ValidationSeverity, ValidatorConfig};
