//! Token-bucket gate for metered upstream APIs.
//!
//! A single [`RateLimiter`] is created per external API at startup and
//! shared (behind an `Arc`) by every caller of that API, so the bucket
//! reflects process-wide usage. Acquisition never blocks: an empty bucket is
//! reported to the caller, which surfaces it as a retryable rate-limit
//! condition.

use std::sync::{Mutex, PoisonError};

use tokio::time::Instant;

/// Token bucket with a fixed capacity and a steady refill rate.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Creates a full bucket holding `capacity` tokens that refills at
    /// `refill_per_sec` tokens per second.
    #[must_use]
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            capacity,
            refill_per_sec: refill_per_sec.max(0.0),
            state: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// A bucket of `rate` tokens that refills `rate` tokens every second.
    #[must_use]
    pub fn per_second(rate: u32) -> Self {
        Self::new(rate, f64::from(rate))
    }

    /// Takes one token if available.
    ///
    /// Returns `false` when the bucket is empty. The caller should treat
    /// that as a retryable rate-limit condition rather than waiting.
    pub fn try_acquire(&self) -> bool {
        // The bucket holds plain numbers, so a poisoned lock still has a
        // usable value.
        let mut bucket = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut bucket);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            log::debug!("Rate limiter exhausted ({} tokens/s)", self.refill_per_sec);
            false
        }
    }

    /// Tokens currently available, rounded down.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn available(&self) -> u32 {
        let mut bucket = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut bucket);
        bucket.tokens.floor() as u32
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens = elapsed
            .as_secs_f64()
            .mul_add(self.refill_per_sec, bucket.tokens)
            .min(self.capacity);
        bucket.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn drains_to_capacity_then_rejects() {
        let limiter = RateLimiter::new(3, 1.0);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn refills_over_time() {
        let limiter = RateLimiter::new(2, 2.0);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(limiter.available(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shared_bucket_is_process_wide() {
        let limiter = Arc::new(RateLimiter::per_second(50));
        let handles = (0..60)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.try_acquire() })
            })
            .collect::<Vec<_>>();

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 50);
    }
}
