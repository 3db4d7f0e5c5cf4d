//! Shared exponential-backoff-with-jitter retry schedule.
//!
//! Both the inbox and deliver queue handlers reschedule failed jobs with
//! this schedule so retry semantics stay consistent and testable in one
//! place.

use rand::Rng;
use std::time::Duration;

/// Maximum number of attempts before a job is permanently Failed.
pub const MAX_ATTEMPTS: u32 = 10;

/// Exponential backoff schedule with a bounded random jitter.
#[derive(Debug, Clone)]
pub struct BackoffSchedule {
    /// Base delay of the first retry.
    pub initial_delay: Duration,
    /// Ceiling for the computed base delay.
    pub max_delay: Duration,
    /// Multiplier for exponential growth.
    pub multiplier: f64,
    /// Fraction of the base delay added as random jitter (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(8 * 3600),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}

impl BackoffSchedule {
    /// Schedule used for inbound activity processing retries.
    #[must_use]
    pub const fn inbox() -> Self {
        Self {
            initial_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(3600),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }

    /// Schedule used for outbound delivery retries: capped at 8 hours.
    #[must_use]
    pub const fn deliver() -> Self {
        Self {
            initial_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(8 * 3600),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }

    /// Base delay (no jitter) for the given attempt, 1-indexed.
    ///
    /// Non-decreasing in `attempt` and never exceeds `max_delay`.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let delay_secs =
            self.initial_delay.as_secs_f64() * self.multiplier.powi((attempt - 1) as i32);
        let delay = Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()));

        delay.min(self.max_delay)
    }

    /// Delay for the given attempt with jitter applied.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter <= 0.0 {
            return base;
        }
        let jitter_secs = rand::thread_rng().gen_range(0.0..=base.as_secs_f64() * self.jitter);
        base + Duration::from_secs_f64(jitter_secs)
    }

    /// Whether another attempt should be scheduled after `attempts`
    /// attempts have already run.
    #[must_use]
    pub const fn should_retry(&self, attempts: u32) -> bool {
        attempts < MAX_ATTEMPTS
    }
}
