//! Last-known-good consensus cache.
//!
//! Keyed by canonical symbol. Written after every successful live round and
//! read only when a round produced nothing. Writes are last-write-wins per
//! symbol.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::MarketDataError;
use crate::models::source::duration_secs;
use crate::models::{CacheEntry, ConsensusResult, DataClass};

/// TTL per data class. Live quotes go stale fast; FX reference rates don't.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    #[serde(rename = "quoteTtlSecs", with = "duration_secs")]
    pub quote_ttl: Duration,
    #[serde(rename = "indexTtlSecs", with = "duration_secs")]
    pub index_ttl: Duration,
    #[serde(rename = "volatilityTtlSecs", with = "duration_secs")]
    pub volatility_ttl: Duration,
    #[serde(rename = "fxRateTtlSecs", with = "duration_secs")]
    pub fx_rate_ttl: Duration,
    /// Single TTL applied to every class when set.
    pub cache_ttl_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            quote_ttl: Duration::from_secs(15 * 60),
            index_ttl: Duration::from_secs(15 * 60),
            volatility_ttl: Duration::from_secs(15 * 60),
            fx_rate_ttl: Duration::from_secs(24 * 60 * 60),
            cache_ttl_secs: None,
        }
    }
}

impl CacheConfig {
    pub fn ttl_for(&self, class: DataClass) -> Duration {
        if let Some(secs) = self.cache_ttl_secs {
            return Duration::from_secs(secs);
        }
        match class {
            DataClass::Quote => self.quote_ttl,
            DataClass::Index => self.index_ttl,
            DataClass::Volatility => self.volatility_ttl,
            DataClass::FxRate => self.fx_rate_ttl,
        }
    }
}

/// Writes between sweeps of expired entries.
const PURGE_EVERY: u64 = 256;

/// Concurrent symbol -> last live result store.
#[derive(Debug, Default)]
pub struct ConsensusCache {
    entries: DashMap<String, CacheEntry>,
    config: CacheConfig,
    writes: AtomicU64,
}

impl ConsensusCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            writes: AtomicU64::new(0),
        }
    }

    /// Store a live result. Cached or degraded results are never stored.
    ///
    /// Every `PURGE_EVERY` writes, entries past their TTL are dropped so
    /// symbols that are never read again do not pile up.
    pub fn put(&self, result: &ConsensusResult, now: DateTime<Utc>) {
        if !result.quality.is_live() || !result.has_value() {
            return;
        }
        let ttl = self.config.ttl_for(DataClass::classify(&result.symbol));
        debug!("Caching {} for {:?}", result.symbol, ttl);
        self.entries
            .insert(result.symbol.clone(), CacheEntry::new(result.clone(), now, ttl));

        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % PURGE_EVERY == 0 {
            let purged = self.purge_expired(now);
            if purged > 0 {
                debug!("Purged {} expired cache entries", purged);
            }
        }
    }

    /// Non-expired entry for `symbol`, or `CacheMiss`. An expired entry is
    /// evicted on the way out.
    pub fn get_fresh(&self, symbol: &str, now: DateTime<Utc>) -> Result<CacheEntry, MarketDataError> {
        let miss = || MarketDataError::CacheMiss {
            symbol: symbol.to_string(),
        };

        let entry = self.entries.get(symbol).map(|e| e.value().clone()).ok_or_else(miss)?;
        if entry.is_expired(now) {
            debug!(
                "Cache entry for {} expired ({:?} old, ttl {:?})",
                symbol,
                entry.age(now),
                entry.ttl
            );
            self.entries.remove_if(symbol, |_, current| current.is_expired(now));
            return Err(miss());
        }
        Ok(entry)
    }

    /// Drop entries that have outlived their TTL.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }

    pub fn remove(&self, symbol: &str) -> Option<CacheEntry> {
        self.entries.remove(symbol).map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}
