use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ConsensusResult;
use super::source::duration_secs;

/// Last-known-good answer for one symbol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub symbol: String,
    pub value: ConsensusResult,
    pub fetched_at: DateTime<Utc>,
    #[serde(rename = "ttlSecs", with = "duration_secs")]
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(value: ConsensusResult, fetched_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            symbol: value.symbol.clone(),
            value,
            fetched_at,
            ttl,
        }
    }

    /// Time since the entry was written (zero if the clock went backwards).
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.fetched_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Entries older than their TTL are treated as absent.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.age(now) > self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_age_and_expiry() {
        let fetched_at = Utc::now();
        let value = ConsensusResult::degraded("AAPL", "placeholder", fetched_at);
        let entry = CacheEntry::new(value, fetched_at, Duration::from_secs(60));

        assert_eq!(entry.symbol, "AAPL");
        assert!(!entry.is_expired(fetched_at + ChronoDuration::seconds(60)));
        assert!(entry.is_expired(fetched_at + ChronoDuration::seconds(61)));
        assert_eq!(
            entry.age(fetched_at + ChronoDuration::seconds(30)),
            Duration::from_secs(30)
        );
        assert_eq!(entry.age(fetched_at - ChronoDuration::seconds(5)), Duration::ZERO);
    }
}
