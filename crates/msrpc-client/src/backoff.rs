//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Delay before retry number `attempt` (1-based): `base_ms * 2^(attempt-1)`,
/// capped at `max_ms`, plus up to 10% jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let capped_delay = base_ms.saturating_mul(exponential_base).min(max_ms);

    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        assert_eq!(calculate_backoff(0, 100, 2000), Duration::ZERO);

        let first = calculate_backoff(1, 100, 2000);
        assert!(first >= Duration::from_millis(100) && first < Duration::from_millis(110));

        let second = calculate_backoff(2, 100, 2000);
        assert!(second >= Duration::from_millis(200) && second < Duration::from_millis(220));

        let capped = calculate_backoff(30, 100, 1000);
        assert!(capped >= Duration::from_millis(1000) && capped < Duration::from_millis(1100));
    }

    #[test]
    fn test_zero_base() {
        assert_eq!(calculate_backoff(3, 0, 1000), Duration::ZERO);
    }
}
