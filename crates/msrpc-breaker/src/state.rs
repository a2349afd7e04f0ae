use std::fmt;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Normal operation, calls flow through and failures are counted
    Closed,
    /// Limited trial traffic after the open timeout
    HalfOpen,
    /// Tripped, calls fail fast without running
    Open,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Closed => write!(f, "closed"),
            State::HalfOpen => write!(f, "half-open"),
            State::Open => write!(f, "open"),
        }
    }
}

/// Call statistics for the current generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    pub(crate) fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    pub(crate) fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    pub(crate) fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }

    pub(crate) fn clear(&mut self) {
        *self = Counts::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_track_streaks() {
        let mut counts = Counts::default();
        counts.on_request();
        counts.on_failure();
        counts.on_request();
        counts.on_failure();
        assert_eq!(counts.consecutive_failures, 2);

        counts.on_request();
        counts.on_success();
        assert_eq!(
            counts,
            Counts {
                requests: 3,
                total_successes: 1,
                total_failures: 2,
                consecutive_successes: 1,
                consecutive_failures: 0,
            }
        );

        counts.clear();
        assert_eq!(counts, Counts::default());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(State::HalfOpen.to_string(), "half-open");
    }
}
