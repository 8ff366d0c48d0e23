//! # Fibonacci Backoff
//!
//! Progressive backoff that grows more slowly than exponential backoff. Used
//! for per-object reconciliation requeues (1m, 1m, 2m, 3m, 5m, 8m, 10m max)
//! and, with second-scale bounds, for retrying deletes that hit a dependency.

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each backoff is the sum of the previous two, capped at `max`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min: Duration,
    prev: Duration,
    current: Duration,
    max: Duration,
}

impl FibonacciBackoff {
    /// Create a backoff starting at `min` and capped at `max`.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            prev: Duration::ZERO,
            current: min,
            max,
        }
    }

    /// Reconciliation error backoff: 1 minute up to 10 minutes.
    #[must_use]
    pub fn reconcile() -> Self {
        Self::new(Duration::from_secs(60), Duration::from_secs(600))
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        let next = self.prev + self.current;
        self.prev = self.current;
        self.current = std::cmp::min(next, self.max);
        result
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.prev = Duration::ZERO;
        self.current = self.min;
    }

    /// Backoff for the given attempt (0-indexed) without keeping state.
    ///
    /// Attempts 0 and 1 both return `min`.
    #[must_use]
    pub fn for_attempt(attempt: u32, min: Duration, max: Duration) -> Duration {
        let mut backoff = Self::new(min, max);
        let mut delay = backoff.next_backoff();
        for _ in 0..attempt {
            delay = backoff.next_backoff();
            if delay >= max {
                break;
            }
        }
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(backoff: &mut FibonacciBackoff) -> u64 {
        backoff.next_backoff().as_secs()
    }

    #[test]
    fn test_fibonacci_backoff_sequence() {
        let mut backoff = FibonacciBackoff::reconcile();

        // 1m, 1m, 2m, 3m, 5m, 8m, 10m (max)
        assert_eq!(secs(&mut backoff), 60);
        assert_eq!(secs(&mut backoff), 60);
        assert_eq!(secs(&mut backoff), 120);
        assert_eq!(secs(&mut backoff), 180);
        assert_eq!(secs(&mut backoff), 300);
        assert_eq!(secs(&mut backoff), 480);
        assert_eq!(secs(&mut backoff), 600);
        // 13m would be next; stays capped
        assert_eq!(secs(&mut backoff), 600);
        assert_eq!(secs(&mut backoff), 600);
    }

    #[test]
    fn test_fibonacci_backoff_reset() {
        let mut backoff = FibonacciBackoff::reconcile();

        assert_eq!(secs(&mut backoff), 60);
        assert_eq!(secs(&mut backoff), 60);
        assert_eq!(secs(&mut backoff), 120);
        assert_eq!(secs(&mut backoff), 180);

        backoff.reset();

        assert_eq!(secs(&mut backoff), 60);
        assert_eq!(secs(&mut backoff), 60);
        assert_eq!(secs(&mut backoff), 120);
    }

    #[test]
    fn test_for_attempt_matches_sequence() {
        let min = Duration::from_secs(1);
        let max = Duration::from_secs(10);
        let expected = [1, 1, 2, 3, 5, 8, 10, 10];
        for (attempt, want) in expected.iter().enumerate() {
            let got = FibonacciBackoff::for_attempt(attempt as u32, min, max);
            assert_eq!(got, Duration::from_secs(*want), "attempt {attempt}");
        }
    }
}
