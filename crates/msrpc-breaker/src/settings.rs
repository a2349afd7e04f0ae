use std::sync::Arc;
use std::time::Duration;

use crate::error::BreakerError;
use crate::state::{Counts, State};

/// Open timeout used when none is configured (20 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Consecutive failures tolerated by the default trip predicate.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

pub type TripPredicate = Arc<dyn Fn(&Counts) -> bool + Send + Sync>;
pub type SuccessPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;
pub type StateChangeHook = Arc<dyn Fn(&str, State, State) + Send + Sync>;
pub type Fallback<T, E> = Arc<dyn Fn(BreakerError<E>) -> Result<T, BreakerError<E>> + Send + Sync>;

/// Circuit breaker configuration.
///
/// # Defaults
///
/// - `max_requests`: 1 (0 is treated as 1)
/// - `interval`: zero, counts are never rolled over while closed
/// - `timeout`: 20 seconds (zero is treated as the default)
/// - `ready_to_trip`: more than 5 consecutive failures
/// - `is_successful`: every error is a failure
pub struct Settings<T, E> {
    pub name: String,
    /// Trial calls allowed while half-open; closing takes more consecutive
    /// successes than this.
    pub max_requests: u32,
    /// Period after which a closed breaker clears its counts.
    pub interval: Duration,
    /// How long the breaker stays open before trying half-open.
    pub timeout: Duration,
    pub ready_to_trip: TripPredicate,
    /// Decides whether an error still counts as a success, e.g. for errors
    /// that say nothing about the health of the callee.
    pub is_successful: SuccessPredicate<E>,
    pub on_state_change: Option<StateChangeHook>,
    /// Substitute result for rejected calls.
    pub fallback: Option<Fallback<T, E>>,
}

impl<T: 'static, E: 'static> Settings<T, E> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_requests: 1,
            interval: Duration::ZERO,
            timeout: DEFAULT_TIMEOUT,
            ready_to_trip: Arc::new(|counts: &Counts| {
                counts.consecutive_failures > DEFAULT_FAILURE_THRESHOLD
            }),
            is_successful: Arc::new(|_: &E| false),
            on_state_change: None,
            fallback: None,
        }
    }

    pub fn with_max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Trips after more than `threshold` consecutive failures.
    pub fn with_failure_threshold(self, threshold: u32) -> Self {
        self.with_ready_to_trip(move |counts| counts.consecutive_failures > threshold)
    }

    pub fn with_ready_to_trip<F>(mut self, ready_to_trip: F) -> Self
    where
        F: Fn(&Counts) -> bool + Send + Sync + 'static,
    {
        self.ready_to_trip = Arc::new(ready_to_trip);
        self
    }

    pub fn with_is_successful<F>(mut self, is_successful: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.is_successful = Arc::new(is_successful);
        self
    }

    pub fn with_on_state_change<F>(mut self, on_state_change: F) -> Self
    where
        F: Fn(&str, State, State) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(on_state_change));
        self
    }

    pub fn with_fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn(BreakerError<E>) -> Result<T, BreakerError<E>> + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(fallback));
        self
    }

    /// Applies the documented replacements for zero values.
    pub(crate) fn normalized(mut self) -> Self {
        if self.max_requests == 0 {
            self.max_requests = 1;
        }
        if self.timeout.is_zero() {
            self.timeout = DEFAULT_TIMEOUT;
        }
        self
    }
}

impl<T, E> Clone for Settings<T, E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            max_requests: self.max_requests,
            interval: self.interval,
            timeout: self.timeout,
            ready_to_trip: Arc::clone(&self.ready_to_trip),
            is_successful: Arc::clone(&self.is_successful),
            on_state_change: self.on_state_change.clone(),
            fallback: self.fallback.clone(),
        }
    }
}

impl<T, E> std::fmt::Debug for Settings<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("name", &self.name)
            .field("max_requests", &self.max_requests)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}
