//! Token bucket rate limiter for a single source.
//!
//! Each source owns one bucket holding `calls` tokens. A spent token flows
//! back into the bucket exactly `window` after it was spent, so no rolling
//! window of that length ever sees more than `calls` permits. Acquisition
//! never waits: an empty bucket means the source sits this round out.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, warn};
use tokio::time::Instant;

use crate::models::RateLimitSpec;

#[derive(Debug)]
struct Bucket {
    /// Spend times of tokens that have not yet flowed back.
    spent: VecDeque<Instant>,
}

impl Bucket {
    /// Return tokens whose window has elapsed.
    fn refill(&mut self, now: Instant, window: Duration) {
        while let Some(front) = self.spent.front() {
            if now.saturating_duration_since(*front) >= window {
                self.spent.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Per-source token bucket.
///
/// Thread-safe; concurrent symbol requests hitting the same source share
/// one bucket. Different sources never share a lock.
pub struct TokenBucket {
    source: String,
    capacity: u32,
    window: Duration,
    bucket: Mutex<Bucket>,
}

impl TokenBucket {
    pub fn new(source: impl Into<String>, spec: RateLimitSpec) -> Self {
        Self {
            source: source.into(),
            capacity: spec.calls,
            window: spec.window,
            bucket: Mutex::new(Bucket {
                spent: VecDeque::with_capacity(spec.calls as usize),
            }),
        }
    }

    /// Lock the bucket, recovering from poison if necessary.
    ///
    /// The worst case after a poisoned lock is a slightly inaccurate token
    /// count, which is better than panicking in the fetch path.
    fn lock_bucket(&self) -> MutexGuard<'_, Bucket> {
        self.bucket.lock().unwrap_or_else(|poisoned| {
            warn!(
                "Rate limiter mutex for '{}' was poisoned, recovering",
                self.source
            );
            poisoned.into_inner()
        })
    }

    /// Try to take a token without waiting.
    ///
    /// Returns true if a token was available, false if the source is
    /// rate limited for now.
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut bucket = self.lock_bucket();
        bucket.refill(now, self.window);

        if (bucket.spent.len() as u32) < self.capacity {
            bucket.spent.push_back(now);
            true
        } else {
            debug!("Rate limiter: no token available for '{}'", self.source);
            false
        }
    }

    /// Tokens available right now.
    pub fn remaining(&self) -> u32 {
        let mut bucket = self.lock_bucket();
        bucket.refill(Instant::now(), self.window);
        self.capacity.saturating_sub(bucket.spent.len() as u32)
    }

    /// Time until the next token flows back (zero if one is available).
    pub fn time_until_available(&self) -> Duration {
        let now = Instant::now();
        let mut bucket = self.lock_bucket();
        bucket.refill(now, self.window);

        if (bucket.spent.len() as u32) < self.capacity {
            return Duration::ZERO;
        }
        bucket
            .spent
            .front()
            .map(|oldest| self.window.saturating_sub(now.saturating_duration_since(*oldest)))
            .unwrap_or(Duration::ZERO)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Refill the bucket completely.
    pub fn reset(&self) {
        self.lock_bucket().spent.clear();
    }
}
