//! Static per-source configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::MarketDataError;

/// Default relative trust for a source.
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Default ordering priority (lower = earlier).
pub const DEFAULT_PRIORITY: u8 = 10;

/// Calls allowed per window for a single source's token bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSpec {
    /// Maximum calls in any rolling window.
    pub calls: u32,

    /// Window length.
    #[serde(rename = "windowSecs", with = "duration_secs")]
    pub window: Duration,
}

impl RateLimitSpec {
    pub const fn per_minute(calls: u32) -> Self {
        Self {
            calls,
            window: Duration::from_secs(60),
        }
    }
}

impl Default for RateLimitSpec {
    fn default() -> Self {
        Self::per_minute(60)
    }
}

/// Static configuration for one upstream provider.
///
/// Immutable once the registry is built. `requires_credential` sources are
/// disabled at build time when `credential_env` is unset or empty.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceConfig {
    pub name: String,
    pub weight: f64,
    pub priority: u8,
    pub enabled: bool,
    pub requires_credential: bool,
    /// Environment variable holding the API key.
    pub credential_env: Option<String>,
    pub rate_limit: RateLimitSpec,
}

impl SourceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitSpec) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_credential(mut self, env_var: impl Into<String>) -> Self {
        self.requires_credential = true;
        self.credential_env = Some(env_var.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Checks the load-time invariants for this source.
    pub fn validate(&self) -> Result<(), MarketDataError> {
        if self.name.trim().is_empty() {
            return Err(MarketDataError::Config(
                "source name must not be empty".to_string(),
            ));
        }
        if self.enabled && !(self.weight.is_finite() && self.weight > 0.0) {
            return Err(MarketDataError::Config(format!(
                "source '{}' must have a positive weight, got {}",
                self.name, self.weight
            )));
        }
        if self.rate_limit.calls == 0 || self.rate_limit.window.is_zero() {
            return Err(MarketDataError::Config(format!(
                "source '{}' needs a non-zero rate limit",
                self.name
            )));
        }
        Ok(())
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            weight: DEFAULT_WEIGHT,
            priority: DEFAULT_PRIORITY,
            enabled: true,
            requires_credential: false,
            credential_env: None,
            rate_limit: RateLimitSpec::default(),
        }
    }
}

pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom(format!(
                "duration must be a non-negative number of seconds, got {}",
                secs
            )));
        }
        Duration::try_from_secs_f64(secs).map_err(|e| {
            serde::de::Error::custom(format!("duration of {} seconds is out of range: {}", secs, e))
        })
    }
}
