//! Resilience utilities: backoff schedules and rate limiting.
//!
//! - [`RetryConfig`]: exponential backoff, used per work item by the queue
//!   and for re-listing after a dropped watch
//! - [`RateLimiter`]: token bucket shared by every requeue, so a burst of
//!   failing items cannot hammer the store or the sinks
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() {
//! use release_watch::resilience::{RateLimiter, RateLimitConfig, RetryConfig};
//!
//! let backoff = RetryConfig::queue();
//! assert_eq!(backoff.delay_for_attempt(1).as_millis(), 5);
//!
//! let limiter = RateLimiter::new(RateLimitConfig::default());
//! limiter.acquire().await; // Blocks if over limit
//! # }
//! ```

use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovLimiter,
};
use std::num::NonZeroU32;
use std::time::Duration;

/// Exponential backoff schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Attempts before giving up. For work items this is the retry ceiling
    /// read by the workers through [`WorkQueue::backoff`](crate::queue::WorkQueue::backoff):
    /// the item is processed at most this many times.
    /// Set to `usize::MAX` for infinite retries.
    pub max_attempts: usize,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Maximum delay between retries (ceiling for exponential backoff).
    pub max_delay: Duration,

    /// Backoff multiplier (e.g., 2.0 = double delay each retry).
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::queue()
    }
}

impl RetryConfig {
    /// Per-item requeue schedule.
    ///
    /// # Backoff Schedule
    ///
    /// ```text
    /// Attempt  Delay
    /// -------  -----
    /// 1        5ms
    /// 2        10ms
    /// 3        20ms
    /// 4        40ms
    /// 5        (dropped and reported)
    /// ```
    pub fn queue() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_secs(1000),
            backoff_factor: 2.0,
        }
    }

    /// Re-list schedule after the watch stream drops.
    ///
    /// Never gives up; the cache must eventually catch up again.
    pub fn relist() -> Self {
        Self {
            max_attempts: usize::MAX,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
        }
    }

    /// Fast schedule for tests.
    pub fn testing() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(20),
            backoff_factor: 2.0,
        }
    }

    /// Calculate delay for a given attempt number (1-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay;
        }

        // Clamp the exponent; the cap is reached long before this anyway.
        let exponent = (attempt - 1).min(64) as i32;
        let multiplier = self.backoff_factor.powi(exponent);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }

        Duration::from_secs_f64(delay_secs)
    }
}

// =============================================================================
// Rate Limiting
// =============================================================================

/// Configuration for rate limiting.
///
/// Uses a token bucket algorithm: tokens refill at `refill_rate` per second,
/// up to `burst_size` tokens. Each requeue consumes one token.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Maximum tokens that can be accumulated (burst capacity).
    pub burst_size: u32,

    /// Tokens added per second (sustained rate).
    pub refill_rate: u32,
}

impl Default for RateLimitConfig {
    /// Default: 10 requeues/sec with burst of 100.
    fn default() -> Self {
        Self {
            burst_size: 100,
            refill_rate: 10,
        }
    }
}

impl RateLimitConfig {
    /// No rate limiting (unlimited).
    pub fn unlimited() -> Self {
        Self {
            burst_size: u32::MAX,
            refill_rate: u32::MAX,
        }
    }
}

/// Token bucket rate limiter.
///
/// Thread-safe and async-aware.
pub struct RateLimiter {
    limiter: GovLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Create a new rate limiter with the given configuration.
    pub fn new(config: RateLimitConfig) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(config.refill_rate).unwrap_or(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN));

        Self {
            limiter: GovLimiter::direct(quota),
            config,
        }
    }

    /// Acquire a permit, blocking until one is available.
    ///
    /// This method is cancel-safe.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    /// Try to acquire a permit without blocking.
    ///
    /// Returns `true` if acquired, `false` if rate limit exceeded.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_queue_schedule() {
        let config = RetryConfig::queue();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(5));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(10));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(20));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(40));
    }

    #[test]
    fn test_default_is_queue() {
        assert_eq!(RetryConfig::default(), RetryConfig::queue());
    }

    #[test]
    fn test_relist_never_gives_up() {
        let config = RetryConfig::relist();
        assert_eq!(config.max_attempts, usize::MAX);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(config.delay_for_attempt(50), Duration::from_secs(60));
    }

    #[test]
    fn test_delay_for_attempt_zero() {
        let config = RetryConfig::testing();
        assert_eq!(config.delay_for_attempt(0), config.initial_delay);
    }

    #[test]
    fn test_delay_for_attempt_caps_at_max() {
        let config = RetryConfig::queue();
        assert_eq!(config.delay_for_attempt(40), Duration::from_secs(1000));
        assert_eq!(config.delay_for_attempt(10_000), Duration::from_secs(1000));
        assert_eq!(config.delay_for_attempt(usize::MAX), Duration::from_secs(1000));
    }

    #[test]
    fn test_rate_limit_defaults() {
        let config = RateLimitConfig::default();
        assert_eq!(config.refill_rate, 10);
        assert_eq!(config.burst_size, 100);

        let unlimited = RateLimitConfig::unlimited();
        assert_eq!(unlimited.burst_size, u32::MAX);
    }

    #[test]
    fn test_rate_limiter_try_acquire_burst() {
        let limiter = RateLimiter::new(RateLimitConfig {
            burst_size: 3,
            refill_rate: 1,
        });

        for _ in 0..3 {
            assert!(limiter.try_acquire(), "should acquire within burst");
        }
        assert!(!limiter.try_acquire(), "should fail after burst exhausted");
    }

    #[tokio::test]
    async fn test_rate_limiter_acquire_waits_for_refill() {
        let limiter = RateLimiter::new(RateLimitConfig {
            burst_size: 1,
            refill_rate: 50,
        });

        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(10), "second permit should wait");
    }

    #[test]
    fn test_zero_rates_fall_back_to_one() {
        let limiter = RateLimiter::new(RateLimitConfig {
            burst_size: 0,
            refill_rate: 0,
        });
        assert!(limiter.try_acquire());
        assert_eq!(limiter.config().burst_size, 0);
    }
}
