//! Bounded optimistic-concurrency retries.
//!
//! Every mutation is a read-compute-write closure. The closure returns
//! `VersionConflict` when its conditioned write lost a race; the loop then
//! re-runs it from the read, up to `max_attempts` times, and never past the
//! caller's deadline.

use std::time::{Duration, Instant};

use colmeta_core::config::RetryConfig;
use tracing::{debug, warn};

use crate::error::{ControllerError, ControllerResult};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Attempt `n` waits `n * backoff` before retrying.
    pub backoff: Duration,
    pub deadline: Option<Instant>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.backoff_ms),
            deadline: None,
        }
    }
}

impl RetryPolicy {
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Fails with `Timeout` once the deadline has passed.
    pub fn check_deadline(&self, op: &'static str) -> ControllerResult<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                warn!(op, "deadline exceeded");
                Err(ControllerError::Timeout(op))
            }
            _ => Ok(()),
        }
    }

    /// Run `attempt` until it returns anything other than a version
    /// conflict, the attempt budget is spent, or the deadline passes.
    pub fn run<T, F>(&self, op: &'static str, mut attempt: F) -> ControllerResult<T>
    where
        F: FnMut() -> ControllerResult<T>,
    {
        let mut last_key = String::new();
        for n in 1..=self.max_attempts {
            self.check_deadline(op)?;
            match attempt() {
                Err(ControllerError::VersionConflict { key, .. }) => {
                    debug!(op, %key, attempt = n, "version conflict");
                    last_key = key;
                    if n < self.max_attempts {
                        self.pause(n);
                    }
                }
                other => return other,
            }
        }
        warn!(op, key = %last_key, attempts = self.max_attempts, "retries exhausted");
        Err(ControllerError::VersionConflict {
            key: last_key,
            attempts: self.max_attempts,
        })
    }

    fn pause(&self, attempt: u32) {
        let mut wait = self.backoff.saturating_mul(attempt);
        if let Some(deadline) = self.deadline {
            wait = wait.min(deadline.saturating_duration_since(Instant::now()));
        }
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conflict() -> ControllerError {
        ControllerError::VersionConflict {
            key: "placement".to_string(),
            attempts: 1,
        }
    }

    fn fast() -> RetryPolicy {
        RetryPolicy::default().with_backoff(Duration::ZERO)
    }

    #[test]
    fn succeeds_after_conflicts() {
        let mut calls = 0;
        let result = fast().with_max_attempts(5).run("test", || {
            calls += 1;
            if calls < 3 { Err(conflict()) } else { Ok(calls) }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut calls = 0;
        let result: ControllerResult<()> = fast().with_max_attempts(4).run("test", || {
            calls += 1;
            Err(conflict())
        });
        assert_eq!(calls, 4);
        match result {
            Err(ControllerError::VersionConflict { key, attempts }) => {
                assert_eq!(key, "placement");
                assert_eq!(attempts, 4);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn other_errors_are_not_retried() {
        let mut calls = 0;
        let result: ControllerResult<()> = fast().run("test", || {
            calls += 1;
            Err(ControllerError::NotFound("x".to_string()))
        });
        assert_eq!(calls, 1);
        assert!(result.unwrap_err().is_not_found());
    }

    #[test]
    fn expired_deadline_times_out_without_attempting() {
        let mut calls = 0;
        let policy = fast().with_deadline(Instant::now() - Duration::from_millis(1));
        let result: ControllerResult<()> = policy.run("test", || {
            calls += 1;
            Ok(())
        });
        assert_eq!(calls, 0);
        assert!(matches!(result, Err(ControllerError::Timeout("test"))));
    }

    #[test]
    fn deadline_cuts_retries_short() {
        let policy = RetryPolicy::default()
            .with_max_attempts(1000)
            .with_backoff(Duration::from_millis(20))
            .with_timeout(Duration::from_millis(50));
        let result: ControllerResult<()> = policy.run("test", || Err(conflict()));
        assert!(matches!(result, Err(ControllerError::Timeout(_))));
    }

    #[test]
    fn config_maps_to_policy() {
        let policy = RetryPolicy::from(&RetryConfig {
            max_attempts: 0,
            backoff_ms: 7,
        });
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.backoff, Duration::from_millis(7));
        assert!(policy.deadline.is_none());
    }
}
