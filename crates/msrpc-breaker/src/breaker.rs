use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use futures::FutureExt;

use crate::error::BreakerError;
use crate::settings::Settings;
use crate::state::{Counts, State};

/// Mutable breaker state, guarded by a single mutex.
struct Inner {
    state: State,
    generation: u64,
    counts: Counts,
    /// Closed: end of the current interval. Open: end of the timeout.
    expiry: Option<Instant>,
    /// Transitions to report once the lock is released.
    transitions: Vec<(State, State)>,
}

/// Generation-counted circuit breaker.
///
/// Every state change starts a new generation with fresh counts. A call's
/// outcome is only recorded if the generation it started in is still current
/// when it finishes, so results from before a transition never leak into
/// the next state's accounting.
///
/// # Example
///
/// ```
/// use msrpc_breaker::{BreakerError, CircuitBreaker, Settings, State};
///
/// let breaker = CircuitBreaker::new(Settings::<u32, String>::new("db").with_failure_threshold(1));
/// assert_eq!(breaker.execute(|| Ok(1)), Ok(1));
///
/// let _ = breaker.execute(|| Err("down".to_string()));
/// let _ = breaker.execute(|| Err("down".to_string()));
/// assert_eq!(breaker.state(), State::Open);
/// assert_eq!(breaker.execute(|| Ok(2)), Err(BreakerError::Open));
/// ```
pub struct CircuitBreaker<T, E> {
    settings: Settings<T, E>,
    inner: Mutex<Inner>,
}

impl<T, E> CircuitBreaker<T, E> {
    pub fn new(settings: Settings<T, E>) -> Self
    where
        T: 'static,
        E: 'static,
    {
        let settings = settings.normalized();
        let mut inner = Inner {
            state: State::Closed,
            generation: 0,
            counts: Counts::default(),
            expiry: None,
            transitions: Vec::new(),
        };
        Self::new_generation(&settings, &mut inner, Instant::now());

        Self {
            settings,
            inner: Mutex::new(inner),
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn settings(&self) -> &Settings<T, E> {
        &self.settings
    }

    /// Current state, after applying any time-based transition that is due.
    pub fn state(&self) -> State {
        let (state, _) = self.with_lock(|breaker, inner, now| breaker.current_state(inner, now));
        state
    }

    pub fn counts(&self) -> Counts {
        self.lock().counts
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Runs `call` if the breaker admits it.
    ///
    /// Rejected calls return the fallback's result when one is configured,
    /// otherwise `Open` or `TooManyRequests`. A panic inside `call` is
    /// recorded as a failure and then resumed.
    pub fn execute<F>(&self, call: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let generation = match self.before_request() {
            Ok(generation) => generation,
            Err(rejection) => return self.reject(rejection),
        };

        match panic::catch_unwind(AssertUnwindSafe(call)) {
            Ok(result) => self.finish(generation, result),
            Err(payload) => {
                self.after_request(generation, false);
                panic::resume_unwind(payload)
            }
        }
    }

    /// Async counterpart of [`execute`](Self::execute).
    pub async fn execute_async<F, Fut>(&self, call: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let generation = match self.before_request() {
            Ok(generation) => generation,
            Err(rejection) => return self.reject(rejection),
        };

        match AssertUnwindSafe(call()).catch_unwind().await {
            Ok(result) => self.finish(generation, result),
            Err(payload) => {
                self.after_request(generation, false);
                panic::resume_unwind(payload)
            }
        }
    }

    fn finish(&self, generation: u64, result: Result<T, E>) -> Result<T, BreakerError<E>> {
        let success = match &result {
            Ok(_) => true,
            Err(e) => (self.settings.is_successful)(e),
        };
        self.after_request(generation, success);
        result.map_err(BreakerError::Failed)
    }

    fn reject(&self, rejection: BreakerError<E>) -> Result<T, BreakerError<E>> {
        tracing::debug!("Circuit breaker {} rejected call: {}", self.settings.name, rejection_name(&rejection));
        match &self.settings.fallback {
            Some(fallback) => fallback(rejection),
            None => Err(rejection),
        }
    }

    /// Admits or rejects a call and counts it. Returns the generation the
    /// call belongs to.
    fn before_request(&self) -> Result<u64, BreakerError<E>> {
        self.with_lock(|breaker, inner, now| {
            let (state, generation) = breaker.current_state(inner, now);
            match state {
                State::Open => Err(BreakerError::Open),
                State::HalfOpen if inner.counts.requests > breaker.settings.max_requests => {
                    Err(BreakerError::TooManyRequests)
                }
                _ => {
                    inner.counts.on_request();
                    Ok(generation)
                }
            }
        })
    }

    fn after_request(&self, before: u64, success: bool) {
        self.with_lock(|breaker, inner, now| {
            let (state, generation) = breaker.current_state(inner, now);
            if generation != before {
                return;
            }
            if success {
                breaker.on_success(inner, state, now);
            } else {
                breaker.on_failure(inner, state, now);
            }
        })
    }

    fn on_success(&self, inner: &mut Inner, state: State, now: Instant) {
        match state {
            State::Closed => inner.counts.on_success(),
            State::HalfOpen => {
                inner.counts.on_success();
                if inner.counts.consecutive_successes > self.settings.max_requests {
                    self.set_state(inner, State::Closed, now);
                }
            }
            State::Open => {}
        }
    }

    fn on_failure(&self, inner: &mut Inner, state: State, now: Instant) {
        match state {
            State::Closed => {
                inner.counts.on_failure();
                if (self.settings.ready_to_trip)(&inner.counts) {
                    self.set_state(inner, State::Open, now);
                }
            }
            State::HalfOpen => self.set_state(inner, State::Open, now),
            State::Open => {}
        }
    }

    fn current_state(&self, inner: &mut Inner, now: Instant) -> (State, u64) {
        let expired = inner.expiry.is_some_and(|expiry| expiry <= now);
        match inner.state {
            State::Closed if expired => Self::new_generation(&self.settings, inner, now),
            State::Open if expired => self.set_state(inner, State::HalfOpen, now),
            _ => {}
        }
        (inner.state, inner.generation)
    }

    fn set_state(&self, inner: &mut Inner, state: State, now: Instant) {
        if inner.state == state {
            return;
        }
        let previous = inner.state;
        inner.state = state;
        Self::new_generation(&self.settings, inner, now);
        inner.transitions.push((previous, state));
    }

    fn new_generation(settings: &Settings<T, E>, inner: &mut Inner, now: Instant) {
        inner.generation += 1;
        inner.counts.clear();
        inner.expiry = match inner.state {
            State::Closed if !settings.interval.is_zero() => Some(now + settings.interval),
            State::Closed | State::HalfOpen => None,
            State::Open => Some(now + settings.timeout),
        };
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` under the lock, then reports transitions it caused.
    fn with_lock<R>(&self, f: impl FnOnce(&Self, &mut Inner, Instant) -> R) -> R {
        let (result, transitions) = {
            let mut inner = self.lock();
            let result = f(self, &mut inner, Instant::now());
            (result, std::mem::take(&mut inner.transitions))
        };

        for (from, to) in transitions {
            tracing::info!("Circuit breaker {} changed from {} to {}", self.settings.name, from, to);
            if let Some(hook) = &self.settings.on_state_change {
                hook(&self.settings.name, from, to);
            }
        }
        result
    }
}

fn rejection_name<E>(rejection: &BreakerError<E>) -> &'static str {
    match rejection {
        BreakerError::Open => "open",
        BreakerError::TooManyRequests => "too many requests",
        BreakerError::Failed(_) => "failed",
    }
}

impl<T, E> std::fmt::Debug for CircuitBreaker<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.settings.name)
            .field("state", &inner.state)
            .field("generation", &inner.generation)
            .field("counts", &inner.counts)
            .finish()
    }
}
