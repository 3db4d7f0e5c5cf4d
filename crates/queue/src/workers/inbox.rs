//! Inbox worker: applies one validated inbound activity.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use sparrow_common::{AppError, AppResult, BackoffSchedule};
use sparrow_core::{ActivityHandler, InstanceService};
use sparrow_db::entities::job;
use sparrow_db::repositories::UserRepository;

use crate::jobs::InboxJobData;
use crate::queue::{JobHandler, JobOutcome};
use crate::workers::retry_or_fail;

/// Worker for the inbox queue.
pub struct InboxWorker {
    activity_handler: Arc<dyn ActivityHandler>,
    user_repo: UserRepository,
    instances: InstanceService,
    backoff: BackoffSchedule,
}

impl InboxWorker {
    /// Create an inbox worker.
    #[must_use]
    pub fn new(
        activity_handler: Arc<dyn ActivityHandler>,
        user_repo: UserRepository,
        instances: InstanceService,
    ) -> Self {
        Self {
            activity_handler,
            user_repo,
            instances,
            backoff: BackoffSchedule::inbox(),
        }
    }

    /// Host of the authenticated sender, if the job carries one and the
    /// actor row still exists.
    async fn sender_host(&self, payload: &InboxJobData) -> AppResult<Option<String>> {
        let Some(actor_id) = &payload.authenticated_user_id else {
            return Ok(None);
        };
        Ok(self
            .user_repo
            .find_by_id(actor_id)
            .await?
            .and_then(|user| user.host))
    }
}

#[async_trait]
impl JobHandler for InboxWorker {
    type Payload = InboxJobData;

    async fn handle(&self, job: &job::Model, payload: InboxJobData) -> AppResult<JobOutcome> {
        // The block list may have changed since the request was
        // accepted; a sender blocked in the meantime completes quietly.
        if let Some(host) = self.sender_host(&payload).await?
            && self.instances.is_blocked(&host).await?
        {
            debug!(job_id = %job.id, host = %host, "sender instance now blocked, dropping");
            return Ok(JobOutcome::Completed);
        }

        let document: Value = match serde_json::from_str(&payload.body) {
            Ok(document) => document,
            Err(e) => {
                // The body was valid JSON at accept time; if it is not
                // now, the row is corrupt and a retry cannot help.
                return Err(AppError::Structural(format!("stored body unreadable: {e}")));
            }
        };

        let result = self
            .activity_handler
            .perform(
                &document,
                payload.inbox_user_id.as_deref(),
                payload.authenticated_user_id.as_deref(),
            )
            .await;

        match result {
            Ok(()) => {
                info!(job_id = %job.id, "inbound activity processed");
                Ok(JobOutcome::Completed)
            }
            Err(AppError::BlockedInstance(host)) => {
                // Control condition, not a failure.
                debug!(job_id = %job.id, host = %host, "instance blocked during processing");
                Ok(JobOutcome::Completed)
            }
            Err(e) if e.is_retryable() => retry_or_fail(job, &self.backoff, &e),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use sparrow_common::config::FederationConfig;
    use sparrow_db::repositories::InstanceRepository;
    use std::sync::Mutex;

    struct StubHandler {
        result: Mutex<Option<AppResult<()>>>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl ActivityHandler for StubHandler {
        async fn perform(
            &self,
            _activity: &Value,
            _inbox_user_id: Option<&str>,
            _authenticated_user_id: Option<&str>,
        ) -> AppResult<()> {
            *self.calls.lock().unwrap() += 1;
            self.result.lock().unwrap().take().unwrap_or(Ok(()))
        }
    }

    fn worker_with(result: AppResult<()>) -> (InboxWorker, Arc<StubHandler>) {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let handler = Arc::new(StubHandler {
            result: Mutex::new(Some(result)),
            calls: Mutex::new(0),
        });
        let instances = InstanceService::new(
            InstanceRepository::new(db.clone()),
            &FederationConfig::default(),
        );
        (
            InboxWorker::new(handler.clone(), UserRepository::new(db), instances),
            handler,
        )
    }

    fn queued_job(retry_count: i32) -> job::Model {
        job::Model {
            id: "j1".to_string(),
            queue: "inbox".to_string(),
            status: job::JobStatus::Running,
            payload: serde_json::json!({}),
            retry_count,
            delayed_until: None,
            worker_id: Some("w1".to_string()),
            exception_message: None,
            exception_source: None,
            exception_stack: None,
            created_at: chrono::Utc::now().fixed_offset(),
            updated_at: chrono::Utc::now().fixed_offset(),
        }
    }

    fn payload() -> InboxJobData {
        InboxJobData::new(r#"{"type":"Create"}"#.to_string(), None, None)
    }

    #[tokio::test]
    async fn test_success_completes() {
        let (worker, handler) = worker_with(Ok(()));
        let outcome = worker.handle(&queued_job(0), payload()).await.unwrap();
        assert!(matches!(outcome, JobOutcome::Completed));
        assert_eq!(*handler.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_blocked_instance_completes_quietly() {
        let (worker, _) =
            worker_with(Err(AppError::BlockedInstance("b.example".to_string())));
        let outcome = worker.handle(&queued_job(0), payload()).await.unwrap();
        assert!(matches!(outcome, JobOutcome::Completed));
    }

    #[tokio::test]
    async fn test_transient_error_schedules_retry() {
        let (worker, _) = worker_with(Err(AppError::Federation("timeout".to_string())));
        let outcome = worker.handle(&queued_job(0), payload()).await.unwrap();
        assert!(matches!(outcome, JobOutcome::Retry { .. }));
    }

    #[tokio::test]
    async fn test_transient_error_after_budget_is_terminal() {
        let (worker, _) = worker_with(Err(AppError::Federation("timeout".to_string())));
        assert!(worker.handle(&queued_job(9), payload()).await.is_err());
    }

    #[tokio::test]
    async fn test_structural_error_is_terminal() {
        let (worker, _) = worker_with(Err(AppError::Structural("bad".to_string())));
        assert!(worker.handle(&queued_job(0), payload()).await.is_err());
    }
}
