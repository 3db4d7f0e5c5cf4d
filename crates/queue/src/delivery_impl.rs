//! Queue-backed implementations of the core delivery seams.
//!
//! The HTTP layer and the domain services only see the traits in
//! `sparrow_core`; these adapters turn their calls into durable jobs.

use async_trait::async_trait;
use serde_json::Value;

use sparrow_common::{AppError, AppResult};
use sparrow_core::{ActivityDelivery, InboxSink};

use crate::jobs::{INBOX_QUEUE, InboxJobData, PRE_DELIVER_QUEUE, PreDeliverJobData};
use crate::queue::JobEnqueuer;

/// Admits validated inbound requests to the inbox queue.
#[derive(Clone)]
pub struct QueueInboxSink {
    enqueuer: JobEnqueuer,
}

impl QueueInboxSink {
    /// Create a sink writing to the given enqueuer.
    #[must_use]
    pub const fn new(enqueuer: JobEnqueuer) -> Self {
        Self { enqueuer }
    }
}

#[async_trait]
impl InboxSink for QueueInboxSink {
    async fn enqueue(
        &self,
        body: String,
        inbox_user_id: Option<String>,
        authenticated_user_id: Option<String>,
    ) -> AppResult<()> {
        self.enqueuer
            .enqueue(
                INBOX_QUEUE,
                &InboxJobData::new(body, inbox_user_id, authenticated_user_id),
            )
            .await?;
        Ok(())
    }
}

/// Queues outbound activities for fan-out on the pre-deliver queue.
#[derive(Clone)]
pub struct QueueActivityDelivery {
    enqueuer: JobEnqueuer,
}

impl QueueActivityDelivery {
    /// Create a delivery backend writing to the given enqueuer.
    #[must_use]
    pub const fn new(enqueuer: JobEnqueuer) -> Self {
        Self { enqueuer }
    }
}

#[async_trait]
impl ActivityDelivery for QueueActivityDelivery {
    async fn queue_delivery(
        &self,
        actor_id: &str,
        activity: Value,
        recipient_ids: Vec<String>,
        deliver_to_followers: bool,
    ) -> AppResult<()> {
        let serialized_activity = serde_json::to_string(&activity)
            .map_err(|e| AppError::Queue(format!("cannot serialize activity: {e}")))?;
        self.enqueuer
            .enqueue(
                PRE_DELIVER_QUEUE,
                &PreDeliverJobData {
                    serialized_activity,
                    actor_id: actor_id.to_string(),
                    recipient_ids,
                    deliver_to_followers,
                },
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use sparrow_db::entities::job;
    use sparrow_db::repositories::JobRepository;
    use std::sync::Arc;

    fn queued_job(queue: &str, payload: serde_json::Value) -> job::Model {
        job::Model {
            id: "01jqueued".to_string(),
            queue: queue.to_string(),
            status: job::JobStatus::Queued,
            payload,
            retry_count: 0,
            delayed_until: None,
            worker_id: None,
            exception_message: None,
            exception_source: None,
            exception_stack: None,
            created_at: Utc::now().fixed_offset(),
            updated_at: Utc::now().fixed_offset(),
        }
    }

    fn enqueuer_returning(job: job::Model) -> JobEnqueuer {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![job]])
            .into_connection();
        JobEnqueuer::new(JobRepository::new(Arc::new(db)))
    }

    #[tokio::test]
    async fn test_inbox_sink_enqueues_inbox_job() {
        let payload = serde_json::json!({"body": "{}"});
        let sink = QueueInboxSink::new(enqueuer_returning(queued_job(INBOX_QUEUE, payload)));

        sink.enqueue("{}".to_string(), None, Some("user1".to_string()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_activity_delivery_serializes_once() {
        let payload = serde_json::json!({"serializedActivity": "{}"});
        let delivery =
            QueueActivityDelivery::new(enqueuer_returning(queued_job(PRE_DELIVER_QUEUE, payload)));

        delivery
            .queue_delivery(
                "user1",
                serde_json::json!({"type": "Create"}),
                vec!["user2".to_string()],
                true,
            )
            .await
            .unwrap();
    }
}
