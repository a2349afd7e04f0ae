//! Rate Limiting for msrpc
//!
//! A single token bucket shared by every connection a server accepts.
//!
//! # Architecture
//!
//! - **Disabled** (default): every connection is admitted immediately
//! - **Enabled**: tokens refill at `requests_per_second` up to `burst_size`
//!
//! Admission is bounded in time. [`RateLimiter::acquire_within`] reserves a
//! token and, if that reservation would only mature after the caller's
//! deadline, gives it back and fails at once with `RateLimited`. A caller is
//! never parked past its deadline.
//!
//! # Example
//!
//! ```no_run
//! use msrpc_common::rate_limit::{RateLimiter, RateLimitConfig};
//! use std::time::Duration;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let limiter = RateLimiter::new(RateLimitConfig::per_second(10.0));
//!
//! match limiter.acquire_within(Duration::from_secs(1)).await {
//!     Ok(()) => { /* serve the connection */ }
//!     Err(_) => { /* answer with code 700 */ }
//! }
//! # });
//! ```

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::protocol::error::{MsrpcError, Result};

/// Rates at or above this are treated as unlimited.
const UNLIMITED_RPS: f64 = 1_000_000.0;

/// Configuration for rate limiting.
///
/// # Example
///
/// ```
/// use msrpc_common::rate_limit::RateLimitConfig;
///
/// // 10 requests per second, burst of 20
/// let config = RateLimitConfig::new(10.0, 20);
/// assert_eq!(config.requests_per_second, 10.0);
/// assert_eq!(config.burst_size, 20);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum sustained request rate (requests per second)
    pub requests_per_second: f64,
    /// Maximum burst size (number of tokens)
    pub burst_size: u32,
}

impl RateLimitConfig {
    pub fn new(requests_per_second: f64, burst_size: u32) -> Self {
        Self {
            requests_per_second,
            burst_size,
        }
    }

    /// Creates a configuration with burst size set to 2x the rate.
    ///
    /// ```
    /// use msrpc_common::rate_limit::RateLimitConfig;
    ///
    /// let config = RateLimitConfig::per_second(10.0);
    /// assert_eq!(config.burst_size, 20);
    /// ```
    pub fn per_second(rps: f64) -> Self {
        let burst_size = (rps * 2.0).ceil() as u32;
        Self::new(rps, burst_size)
    }

    pub fn is_enabled(&self) -> bool {
        self.requests_per_second < UNLIMITED_RPS
    }
}

impl Default for RateLimitConfig {
    /// Rate limiting disabled.
    fn default() -> Self {
        Self {
            requests_per_second: f64::MAX,
            burst_size: u32::MAX,
        }
    }
}

/// Result of a non-blocking rate limit check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed,
    RateLimited {
        /// Time until the next token will be available
        retry_after: Duration,
    },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Allowed => None,
            Self::RateLimited { retry_after } => Some(*retry_after),
        }
    }
}

/// Token bucket state.
///
/// `tokens` may go negative: outstanding reservations are debts that the
/// refill pays back before anyone else is admitted.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(burst_size: u32) -> Self {
        Self {
            tokens: burst_size as f64,
            last_update: Instant::now(),
        }
    }

    fn refill(&mut self, config: &RateLimitConfig, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * config.requests_per_second).min(config.burst_size as f64);
        self.last_update = now;
    }

    /// Consumes a token only if one is available right now.
    fn try_consume(&mut self, config: &RateLimitConfig, now: Instant) -> bool {
        self.refill(config, now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Reserves a token and returns how long until it matures, or `None`
    /// (leaving the bucket untouched) if that is longer than `max_wait`.
    fn reserve(&mut self, config: &RateLimitConfig, now: Instant, max_wait: Duration) -> Option<Duration> {
        self.refill(config, now);
        let remaining = self.tokens - 1.0;
        let wait = if remaining >= 0.0 {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64(-remaining / config.requests_per_second).unwrap_or(Duration::MAX)
        };

        if wait > max_wait {
            return None;
        }
        self.tokens = remaining;
        Some(wait)
    }

    fn time_until_next_token(&self, config: &RateLimitConfig) -> Duration {
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64((1.0 - self.tokens) / config.requests_per_second)
                .unwrap_or(Duration::MAX)
        }
    }
}

/// Rate limiter using a token bucket.
///
/// Safe to share across tasks behind an `Arc`; the lock is never held across
/// an await point.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let bucket = TokenBucket::new(config.burst_size);
        Self {
            config,
            bucket: Mutex::new(bucket),
        }
    }

    /// Creates a rate limiter that admits everything.
    pub fn disabled() -> Self {
        Self::new(RateLimitConfig::default())
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    /// Takes a token if one is available right now.
    pub fn try_acquire(&self) -> RateLimitResult {
        if !self.is_enabled() {
            return RateLimitResult::Allowed;
        }
        if self.config.burst_size == 0 || self.config.requests_per_second <= 0.0 {
            return RateLimitResult::RateLimited {
                retry_after: Duration::MAX,
            };
        }

        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        if bucket.try_consume(&self.config, Instant::now()) {
            RateLimitResult::Allowed
        } else {
            RateLimitResult::RateLimited {
                retry_after: bucket.time_until_next_token(&self.config),
            }
        }
    }

    /// Waits for a token for at most `max_wait`.
    ///
    /// # Errors
    ///
    /// Returns `MsrpcError::RateLimited` without waiting when no token can
    /// become available within `max_wait`.
    pub async fn acquire_within(&self, max_wait: Duration) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        if self.config.burst_size == 0 || self.config.requests_per_second <= 0.0 {
            return Err(MsrpcError::RateLimited("limiter admits no requests".to_string()));
        }

        let wait = {
            let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
            bucket.reserve(&self.config, Instant::now(), max_wait)
        };

        match wait {
            Some(wait) if wait.is_zero() => Ok(()),
            Some(wait) => {
                tracing::debug!("Rate limiter delaying admission by {:?}", wait);
                tokio::time::sleep(wait).await;
                Ok(())
            }
            None => Err(MsrpcError::RateLimited(format!(
                "no token available within {:?}",
                max_wait
            ))),
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_config_new() {
        let config = RateLimitConfig::new(10.0, 20);
        assert_eq!(config.requests_per_second, 10.0);
        assert_eq!(config.burst_size, 20);
        assert!(config.is_enabled());
    }

    #[test]
    fn test_rate_limit_config_default_is_disabled() {
        let config = RateLimitConfig::default();
        assert_eq!(config.requests_per_second, f64::MAX);
        assert!(!config.is_enabled());
    }

    #[test]
    fn test_rate_limiter_disabled() {
        let limiter = RateLimiter::disabled();
        for _ in 0..1000 {
            assert!(limiter.try_acquire().is_allowed());
        }
    }

    #[test]
    fn test_rate_limiter_burst() {
        let limiter = RateLimiter::new(RateLimitConfig::new(10.0, 10));

        for _ in 0..10 {
            assert!(limiter.try_acquire().is_allowed());
        }
        let result = limiter.try_acquire();
        assert!(!result.is_allowed());

        // Roughly 0.1 seconds (1 token / 10 rps)
        let retry_after = result.retry_after().unwrap();
        assert!(retry_after.as_millis() <= 110);
    }

    #[test]
    fn test_zero_burst_admits_nothing() {
        let limiter = RateLimiter::new(RateLimitConfig::new(10.0, 0));
        assert!(!limiter.try_acquire().is_allowed());
    }

    #[tokio::test]
    async fn test_acquire_within_rejects_without_waiting() {
        // one token per 100 seconds
        let limiter = RateLimiter::new(RateLimitConfig::new(0.01, 1));
        limiter.acquire_within(Duration::from_millis(10)).await.unwrap();

        let started = Instant::now();
        let err = limiter.acquire_within(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, MsrpcError::RateLimited(_)));
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_acquire_within_waits_for_refill() {
        let limiter = RateLimiter::new(RateLimitConfig::new(20.0, 1));
        limiter.acquire_within(Duration::ZERO).await.unwrap();

        // Next token matures in ~50ms, well inside the deadline
        let started = Instant::now();
        limiter.acquire_within(Duration::from_secs(1)).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_rejected_reservation_is_not_charged() {
        let limiter = RateLimiter::new(RateLimitConfig::new(20.0, 1));
        limiter.acquire_within(Duration::ZERO).await.unwrap();

        for _ in 0..5 {
            assert!(limiter.acquire_within(Duration::ZERO).await.is_err());
        }

        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(limiter.try_acquire().is_allowed());
    }

    #[test]
    fn test_token_bucket_reserve_goes_into_debt() {
        let config = RateLimitConfig::new(10.0, 1);
        let mut bucket = TokenBucket::new(1);
        let now = Instant::now();

        assert_eq!(bucket.reserve(&config, now, Duration::ZERO), Some(Duration::ZERO));
        let wait = bucket.reserve(&config, now, Duration::from_secs(1)).unwrap();
        assert!(wait >= Duration::from_millis(99) && wait <= Duration::from_millis(101));
        assert!(bucket.tokens < 0.0);

        // A third reservation queues behind the second
        let wait = bucket.reserve(&config, now, Duration::from_secs(1)).unwrap();
        assert!(wait >= Duration::from_millis(199));
    }

    #[test]
    fn test_token_bucket_refill_caps_at_burst() {
        let config = RateLimitConfig::new(10.0, 3);
        let mut bucket = TokenBucket::new(0);
        let later = bucket.last_update + Duration::from_secs(10);
        bucket.refill(&config, later);
        assert_eq!(bucket.tokens, 3.0);
    }
}
