//! Backoff policy for transient provider failures.

use std::time::Duration;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then try again.
    Wait(Duration),
    /// No attempts left.
    GiveUp,
}

/// Exponential backoff: the wait starts at `initial_delay` and doubles
/// after every failed attempt, up to `max_attempts` calls in total.
///
/// The last failed attempt gives up immediately instead of sleeping once
/// more, so the defaults wait 10, 20, 40 and 80 seconds (not a final 160)
/// before a chapter is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
        }
    }

    /// Decide the next step after attempt number `attempt` (1-based) failed,
    /// given the wait that preceded it (`None` before the first retry).
    pub fn after_failure(&self, attempt: u32, previous_delay: Option<Duration>) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }

        let delay = match previous_delay {
            Some(previous) => previous.saturating_mul(2),
            None => self.initial_delay,
        };
        RetryDecision::Wait(delay)
    }

    /// All waits a chapter can go through before giving up.
    #[cfg(test)]
    fn schedule(&self) -> Vec<Duration> {
        let mut waits = Vec::new();
        let mut previous = None;
        for attempt in 1.. {
            match self.after_failure(attempt, previous) {
                RetryDecision::Wait(delay) => {
                    waits.push(delay);
                    previous = Some(delay);
                }
                RetryDecision::GiveUp => break,
            }
        }
        waits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let secs: Vec<u64> = RetryPolicy::default()
            .schedule()
            .iter()
            .map(Duration::as_secs)
            .collect();
        assert_eq!(secs, vec![10, 20, 40, 80]);
    }

    #[test]
    fn test_gives_up_at_cap() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        assert_eq!(
            policy.after_failure(1, None),
            RetryDecision::Wait(Duration::from_secs(1))
        );
        assert_eq!(
            policy.after_failure(2, Some(Duration::from_secs(1))),
            RetryDecision::Wait(Duration::from_secs(2))
        );
        assert_eq!(
            policy.after_failure(3, Some(Duration::from_secs(2))),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn test_single_attempt_never_waits() {
        let policy = RetryPolicy::new(1, Duration::from_secs(10));
        assert_eq!(policy.after_failure(1, None), RetryDecision::GiveUp);
        assert!(policy.schedule().is_empty());
    }

    #[test]
    fn test_doubling_saturates() {
        let policy = RetryPolicy::new(u32::MAX, Duration::MAX);
        assert_eq!(
            policy.after_failure(2, Some(Duration::MAX)),
            RetryDecision::Wait(Duration::MAX)
        );
    }
}
