use std::time::Duration;

/// Bounded exponential backoff for feed reconnection: doubling delays from
/// `base` up to `cap`, at most `max_attempts` tries, then the caller
/// degrades to snapshot-only mode.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap,
            max_attempts,
            attempt: 0,
        }
    }

    /// Delay before the next attempt, or `None` once the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let exp = self.base.saturating_mul(1u32 << self.attempt.min(16));
        self.attempt += 1;
        Some(exp.min(self.cap))
    }

    /// Connection uptime after which a feed counts as stable.
    pub const STABLE_AFTER: Duration = Duration::from_secs(30);

    /// Record a dropped connection that lived for `uptime`. Stable
    /// connections refill the budget; short-lived ones keep spending it,
    /// so a flapping feed still runs out of attempts.
    pub fn connection_ended(&mut self, uptime: Duration) {
        if uptime >= Self::STABLE_AFTER {
            self.reset();
        }
    }

    /// A connection that proved healthy resets the budget.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempts_used(&self) -> u32 {
        self.attempt
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), Duration::from_secs(8), 5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_then_exhaust() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1), 4);
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(400)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(800)));
        assert_eq!(backoff.next_delay(), None);
        assert_eq!(backoff.next_delay(), None);
    }

    #[test]
    fn delays_are_capped() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(2), 5);
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(1)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(2)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn short_lived_connections_keep_spending_budget() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1), 2);
        assert!(backoff.next_delay().is_some());
        backoff.connection_ended(Duration::from_millis(5));
        assert!(backoff.next_delay().is_some());
        backoff.connection_ended(Duration::from_millis(5));
        assert!(backoff.next_delay().is_none());

        backoff.connection_ended(Backoff::STABLE_AFTER);
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn reset_restores_budget() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1), 1);
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());
        backoff.reset();
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
    }
}
