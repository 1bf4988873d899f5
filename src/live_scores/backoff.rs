use std::time::Duration;

/// Exponential reconnect schedule for the live transport.
///
/// Retry `n` (counted from 1) waits `min(base * 2^n, max)`. No jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy {
            base: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Given how many retries have already been made, return the number and
    /// delay of the next one, or `None` once the budget is spent.
    pub fn next_attempt(&self, attempts_made: u32) -> Option<(u32, Duration)> {
        if attempts_made >= self.max_attempts {
            return None;
        }
        let attempt = attempts_made + 1;
        Some((attempt, self.delay(attempt)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_then_cap() {
        let p = ReconnectPolicy::default();
        let delays: Vec<u128> = (1..=6).map(|n| p.delay(n).as_millis()).collect();
        assert_eq!(delays, vec![2000, 4000, 8000, 16000, 30000, 30000]);
    }

    #[test]
    fn test_delay_never_overflows() {
        let p = ReconnectPolicy::default();
        assert_eq!(p.delay(31), Duration::from_secs(30));
        assert_eq!(p.delay(64), Duration::from_secs(30));
        assert_eq!(p.delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_budget_is_five_attempts() {
        let p = ReconnectPolicy::default();
        let mut made = 0;
        let mut schedule = Vec::new();
        while let Some((attempt, delay)) = p.next_attempt(made) {
            schedule.push((attempt, delay.as_millis()));
            made = attempt;
        }
        assert_eq!(
            schedule,
            vec![(1, 2000), (2, 4000), (3, 8000), (4, 16000), (5, 30000)]
        );
        assert!(p.next_attempt(5).is_none());
    }
}
