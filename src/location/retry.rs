use std::time::Duration;

use crate::location::PositionError;

/// How often, and how long after, an unavailable position is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Fixed delay before each re-watch.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(5),
        }
    }
}

/// What to do about a position error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    /// Stop watching and ask the user to grant permission.
    OpenPermissionDrawer,
    /// Re-watch after `delay`. `attempt` counts from 1.
    ScheduleRetry { attempt: u32, delay: Duration },
    /// Retries are used up; tell the user.
    GiveUp,
    /// Keep the current watch running.
    Ignore,
}

/// Counts automatic retries between successful fixes.
#[derive(Debug, Clone, Default)]
pub(crate) struct RetryTracker {
    policy: RetryPolicy,
    attempts: u32,
}

impl RetryTracker {
    pub(crate) fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    pub(crate) fn classify(&mut self, error: PositionError) -> Reaction {
        match error {
            PositionError::PermissionDenied => Reaction::OpenPermissionDrawer,
            PositionError::Timeout => Reaction::Ignore,
            PositionError::PositionUnavailable if self.attempts < self.policy.max_retries => {
                self.attempts += 1;
                Reaction::ScheduleRetry {
                    attempt: self.attempts,
                    delay: self.policy.delay,
                }
            }
            PositionError::PositionUnavailable => Reaction::GiveUp,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.attempts = 0;
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_is_retried_three_times() {
        let mut tracker = RetryTracker::new(RetryPolicy::default());
        for attempt in 1..=3 {
            assert_eq!(
                tracker.classify(PositionError::PositionUnavailable),
                Reaction::ScheduleRetry {
                    attempt,
                    delay: Duration::from_secs(5)
                }
            );
        }
        assert_eq!(
            tracker.classify(PositionError::PositionUnavailable),
            Reaction::GiveUp
        );
        assert_eq!(tracker.attempts(), 3);

        tracker.reset();
        assert!(matches!(
            tracker.classify(PositionError::PositionUnavailable),
            Reaction::ScheduleRetry { attempt: 1, .. }
        ));
    }

    #[test]
    fn test_other_errors_do_not_count() {
        let mut tracker = RetryTracker::new(RetryPolicy::default());
        assert_eq!(
            tracker.classify(PositionError::PermissionDenied),
            Reaction::OpenPermissionDrawer
        );
        assert_eq!(tracker.classify(PositionError::Timeout), Reaction::Ignore);
        assert_eq!(tracker.attempts(), 0);
    }
}
