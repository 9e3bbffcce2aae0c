//! Bounded polling

use std::thread;
use std::time::{Duration, Instant};
use tracing::trace;

/// Outcome of a bounded wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Condition held before the deadline
    Satisfied { elapsed: Duration, attempts: u32 },
    /// Deadline passed with the condition still false
    TimedOut { elapsed: Duration, attempts: u32 },
}

impl WaitOutcome {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, WaitOutcome::Satisfied { .. })
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            WaitOutcome::Satisfied { elapsed, .. } | WaitOutcome::TimedOut { elapsed, .. } => {
                *elapsed
            }
        }
    }
}

/// Poll `condition` every `interval` until it holds or `timeout` elapses.
///
/// The condition is checked once more at the deadline, and the final sleep is
/// clipped so the wait never overshoots the deadline by a whole interval.
pub fn wait_until<F>(timeout: Duration, interval: Duration, mut condition: F) -> WaitOutcome
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    let deadline = start + timeout;
    let mut attempts = 0;

    loop {
        attempts += 1;
        if condition() {
            return WaitOutcome::Satisfied {
                elapsed: start.elapsed(),
                attempts,
            };
        }

        let now = Instant::now();
        if now >= deadline {
            return WaitOutcome::TimedOut {
                elapsed: start.elapsed(),
                attempts,
            };
        }

        let pause = interval.min(deadline - now);
        trace!("Condition not met (attempt {}), sleeping {:?}", attempts, pause);
        thread::sleep(pause);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immediate_success() {
        let outcome = wait_until(Duration::from_secs(5), Duration::from_millis(50), || true);
        assert!(outcome.is_satisfied());
        assert!(outcome.elapsed() < Duration::from_millis(50));
        assert!(matches!(outcome, WaitOutcome::Satisfied { attempts: 1, .. }));
    }

    #[test]
    fn test_success_after_a_few_polls() {
        let mut calls = 0;
        let outcome = wait_until(Duration::from_secs(5), Duration::from_millis(5), || {
            calls += 1;
            calls == 3
        });
        assert!(matches!(outcome, WaitOutcome::Satisfied { attempts: 3, .. }));
    }

    #[test]
    fn test_timeout_is_bounded() {
        let timeout = Duration::from_millis(150);
        let interval = Duration::from_millis(20);
        let outcome = wait_until(timeout, interval, || false);

        assert!(!outcome.is_satisfied());
        assert!(outcome.elapsed() >= timeout);
        assert!(outcome.elapsed() < timeout + interval * 5);
    }

    #[test]
    fn test_zero_timeout_checks_once() {
        let mut calls = 0;
        let outcome = wait_until(Duration::ZERO, Duration::from_millis(10), || {
            calls += 1;
            false
        });
        assert_eq!(calls, 1);
        assert!(matches!(outcome, WaitOutcome::TimedOut { attempts: 1, .. }));
    }
}
