//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
/// capped at `max`, plus up to 10% jitter. Attempt 0 never waits.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
    let delay_ms = base_ms.saturating_mul(factor).min(max_ms);

    let jitter_ms = match delay_ms / 10 {
        0 => 0,
        spread => rand::thread_rng().gen_range(0..=spread),
    };

    Duration::from_millis(delay_ms + jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_attempt_waits_nothing() {
        assert_eq!(calculate_backoff(0, 100, 2000), Duration::ZERO);
    }

    #[test]
    fn test_delay_doubles() {
        let first = calculate_backoff(1, 100, 2000).as_millis();
        let third = calculate_backoff(3, 100, 2000).as_millis();
        assert!((100..=110).contains(&first));
        assert!((400..=440).contains(&third));
    }

    #[test]
    fn test_delay_is_capped() {
        for attempt in [10, 40, 70] {
            let delay = calculate_backoff(attempt, 100, 1000).as_millis();
            assert!((1000..=1100).contains(&delay), "attempt {attempt}: {delay}ms");
        }
    }
}
