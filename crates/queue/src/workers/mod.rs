//! Queue worker implementations.

#![allow(missing_docs)]

pub mod deliver;
pub mod inbox;
pub mod pre_deliver;

pub use deliver::DeliverWorker;
pub use inbox::InboxWorker;
pub use pre_deliver::PreDeliverWorker;

use chrono::{Duration, Utc};
use sparrow_common::{AppError, AppResult, BackoffSchedule};
use sparrow_db::entities::job;

use crate::queue::JobOutcome;

/// Shared retry decision: schedule backoff while budget remains, fail
/// terminally once the attempt that just ran was the last one.
pub(crate) fn retry_or_fail(
    job: &job::Model,
    backoff: &BackoffSchedule,
    error: &AppError,
) -> AppResult<JobOutcome> {
    let attempt = u32::try_from(job.retry_count).unwrap_or(0) + 1;
    if backoff.should_retry(attempt) {
        let delay = Duration::from_std(backoff.delay(attempt)).unwrap_or_else(|_| Duration::zero());
        Ok(JobOutcome::Retry {
            delay_until: Utc::now() + delay,
            reason: error.to_string(),
        })
    } else {
        Err(AppError::Queue(format!(
            "retry budget exhausted after {attempt} attempts: {error}"
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn job_with_retries(retry_count: i32) -> job::Model {
        job::Model {
            id: "j1".to_string(),
            queue: "inbox".to_string(),
            status: job::JobStatus::Running,
            payload: serde_json::json!({}),
            retry_count,
            delayed_until: None,
            worker_id: None,
            exception_message: None,
            exception_source: None,
            exception_stack: None,
            created_at: Utc::now().fixed_offset(),
            updated_at: Utc::now().fixed_offset(),
        }
    }

    #[test]
    fn test_first_failure_schedules_retry() {
        let error = AppError::Federation("timeout".to_string());
        let outcome =
            retry_or_fail(&job_with_retries(0), &BackoffSchedule::inbox(), &error).unwrap();
        match outcome {
            JobOutcome::Retry { delay_until, .. } => assert!(delay_until > Utc::now()),
            JobOutcome::Completed => panic!("expected a retry"),
        }
    }

    #[test]
    fn test_tenth_failure_is_terminal() {
        // retry_count 9 means this was the tenth attempt.
        let error = AppError::Federation("timeout".to_string());
        assert!(retry_or_fail(&job_with_retries(9), &BackoffSchedule::inbox(), &error).is_err());
    }

    #[test]
    fn test_retry_delays_grow() {
        let error = AppError::Federation("timeout".to_string());
        let schedule = BackoffSchedule::deliver();
        let early = match retry_or_fail(&job_with_retries(0), &schedule, &error).unwrap() {
            JobOutcome::Retry { delay_until, .. } => delay_until,
            JobOutcome::Completed => panic!("expected a retry"),
        };
        let late = match retry_or_fail(&job_with_retries(6), &schedule, &error).unwrap() {
            JobOutcome::Retry { delay_until, .. } => delay_until,
            JobOutcome::Completed => panic!("expected a retry"),
        };
        assert!(late > early);
    }
}
