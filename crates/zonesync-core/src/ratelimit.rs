//! Per-credential rate limiting
//!
//! A token bucket refilled at a constant rate up to a burst capacity. Every
//! zone reconciled with the same provider credentials shares one bucket, so
//! concurrent zones cannot push an account over its API quota together.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_update: Instant,
}

/// Token bucket shared across tasks
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    rate_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket.
    ///
    /// A zero rate is treated as unlimited.
    pub fn new(rate_per_sec: u32, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            capacity,
            rate_per_sec: f64::from(rate_per_sec),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_update: Instant::now(),
            }),
        }
    }

    /// Take one token if available, otherwise return how long to wait for it
    fn take(&self) -> Result<(), Duration> {
        if self.rate_per_sec <= 0.0 {
            return Ok(());
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_update).as_secs_f64();

        state.tokens = (state.tokens + elapsed * self.rate_per_sec).min(self.capacity);
        state.last_update = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - state.tokens;
            Err(Duration::from_secs_f64(deficit / self.rate_per_sec))
        }
    }

    /// Take a token without waiting
    pub fn try_acquire(&self) -> bool {
        self.take().is_ok()
    }

    /// Wait until a token is available and take it
    pub async fn acquire(&self) {
        while let Err(wait) = self.take() {
            tokio::time::sleep(wait).await;
        }
    }
}

/// Buckets keyed by provider credential
#[derive(Debug)]
pub struct RateLimiterPool {
    rate_per_sec: u32,
    burst: u32,
    buckets: Mutex<HashMap<String, Arc<TokenBucket>>>,
}

impl RateLimiterPool {
    /// Every bucket created by the pool uses the same rate and burst
    pub fn new(rate_per_sec: u32, burst: u32) -> Self {
        Self {
            rate_per_sec,
            burst,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// The bucket for a credential key, created on first use
    pub fn get(&self, key: &str) -> Arc<TokenBucket> {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        buckets
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(TokenBucket::new(self.rate_per_sec, self.burst)))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_exhausted() {
        let bucket = TokenBucket::new(1, 3);
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn test_zero_rate_is_unlimited() {
        let bucket = TokenBucket::new(0, 1);
        for _ in 0..100 {
            assert!(bucket.try_acquire());
        }
    }

    #[tokio::test]
    async fn test_acquire_waits_for_refill() {
        let bucket = TokenBucket::new(100, 1);
        bucket.acquire().await;

        let started = std::time::Instant::now();
        bucket.acquire().await;
        assert!(started.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn test_pool_shares_buckets_per_key() {
        let pool = RateLimiterPool::new(1, 1);
        let a = pool.get("cloudns:1234");
        let b = pool.get("cloudns:1234");
        let c = pool.get("cloudns:5678");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));

        assert!(a.try_acquire());
        assert!(!b.try_acquire());
        assert!(c.try_acquire());
    }
}
