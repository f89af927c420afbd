/// Classification for retry policy.
///
/// Used by the retry executor to decide whether another attempt is worth
/// making and whether the failure counts against the source's circuit.
///
/// # Behavior Summary
///
/// | Class | Retry? | Record Circuit Breaker Failure? |
/// |-------|--------|--------------------------------|
/// | `WithBackoff` | Yes, after a jittered delay | Yes |
/// | `FailWithPenalty` | No | Yes |
/// | `Never` | No | No |
/// | `Unavailable` | No (source skipped this round) | No |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Transient fault: timeout, connection error, 5xx or upstream 429.
    WithBackoff,

    /// The source answered but the answer is unusable (malformed body,
    /// rejected credential). Retrying won't help, but the source is
    /// misbehaving and should accumulate toward an open circuit.
    FailWithPenalty,

    /// The request itself is the problem (unknown symbol). The source is
    /// healthy; neither retry nor penalize.
    Never,

    /// The source was intentionally not called: circuit open or local
    /// rate-limit bucket empty.
    Unavailable,
}

impl RetryClass {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::WithBackoff)
    }

    pub fn penalizes_circuit(&self) -> bool {
        matches!(self, Self::WithBackoff | Self::FailWithPenalty)
    }
}
