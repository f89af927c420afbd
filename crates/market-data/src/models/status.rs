use serde::Serialize;

use crate::registry::CircuitState;

/// Operational view of one source, as reported by `get_source_status`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatus {
    pub enabled: bool,
    pub circuit_state: CircuitState,
    pub weight: f64,
    pub priority: u8,
    pub consecutive_failures: u32,
    /// Tokens left in the source's rate-limit bucket right now
    pub remaining_calls: u32,
    /// Set when the source is disabled because its API key is missing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<String>,
}
