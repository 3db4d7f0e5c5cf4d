//! Deliver worker: one HTTP-signed POST to one remote inbox.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use sparrow_common::{AppError, AppResult, BackoffSchedule};
use sparrow_core::InstanceService;
use sparrow_db::entities::job;
use sparrow_federation::{ApClient, HttpSigner};

use crate::jobs::DeliverJobData;
use crate::key_cache::SigningKeyCache;
use crate::queue::{JobHandler, JobOutcome};
use crate::workers::retry_or_fail;

/// Worker for the deliver queue.
pub struct DeliverWorker {
    key_cache: SigningKeyCache,
    client: ApClient,
    instances: InstanceService,
    backoff: BackoffSchedule,
}

impl DeliverWorker {
    /// Create a deliver worker.
    #[must_use]
    pub fn new(key_cache: SigningKeyCache, client: ApClient, instances: InstanceService) -> Self {
        Self {
            key_cache,
            client,
            instances,
            backoff: BackoffSchedule::deliver(),
        }
    }
}

#[async_trait]
impl JobHandler for DeliverWorker {
    type Payload = DeliverJobData;

    async fn handle(&self, job: &job::Model, payload: DeliverJobData) -> AppResult<JobOutcome> {
        // Block lists can change between fan-out and delivery.
        if self.instances.is_blocked(&payload.recipient_host).await? {
            debug!(host = %payload.recipient_host, "destination blocked, dropping delivery");
            return Ok(JobOutcome::Completed);
        }

        let key = match self.key_cache.get(&payload.user_id).await {
            Ok(key) => key,
            Err(e) if e.is_retryable() => return retry_or_fail(job, &self.backoff, &e),
            Err(e) => return Err(e),
        };
        let signer = HttpSigner::new(&key.private_key_pem, key.key_id.clone())?;

        match self
            .client
            .post_inbox(
                &payload.inbox_url,
                &payload.payload,
                &payload.content_type,
                &signer,
            )
            .await
        {
            Ok(status) => {
                let success = (200..300).contains(&status);
                self.instances
                    .report_exchange(&payload.recipient_host, Some(status), !success);
                if success {
                    info!(inbox = %payload.inbox_url, status, "delivered");
                    Ok(JobOutcome::Completed)
                } else if status == 410 {
                    // The remote actor is gone; nothing left to deliver to.
                    warn!(inbox = %payload.inbox_url, "inbox gone, dropping delivery");
                    Ok(JobOutcome::Completed)
                } else {
                    // The remote answered; retrying the same payload
                    // will not change its mind.
                    warn!(inbox = %payload.inbox_url, status, "delivery rejected");
                    Err(AppError::Federation(format!(
                        "delivery to {} rejected with status {status}",
                        payload.inbox_url
                    )))
                }
            }
            Err(e) if e.is_transient() => {
                self.instances
                    .report_exchange(&payload.recipient_host, None, true);
                warn!(inbox = %payload.inbox_url, error = %e, "delivery failed, will retry");
                retry_or_fail(job, &self.backoff, &AppError::Federation(e.to_string()))
            }
            Err(e) => Err(AppError::Federation(e.to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use sparrow_common::config::FederationConfig;
    use sparrow_db::repositories::{InstanceRepository, UserKeypairRepository};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_blocked_destination_drops_without_sending() {
        // No mock results: neither the key cache nor the HTTP client
        // may be touched for a blocked destination.
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let federation = FederationConfig {
            blocked_hosts: vec!["bad.example".to_string()],
            ..FederationConfig::default()
        };
        let worker = DeliverWorker::new(
            SigningKeyCache::new(UserKeypairRepository::new(Arc::clone(&db))),
            ApClient::new("https://local.example").unwrap(),
            InstanceService::new(InstanceRepository::new(db), &federation),
        );

        let job = job::Model {
            id: "01jd".to_string(),
            queue: "deliver".to_string(),
            status: job::JobStatus::Running,
            payload: serde_json::json!({}),
            retry_count: 0,
            delayed_until: None,
            worker_id: Some("w1".to_string()),
            exception_message: None,
            exception_source: None,
            exception_stack: None,
            created_at: Utc::now().fixed_offset(),
            updated_at: Utc::now().fixed_offset(),
        };
        let payload = DeliverJobData {
            inbox_url: "https://bad.example/inbox".to_string(),
            payload: "{}".to_string(),
            content_type: "application/activity+json".to_string(),
            user_id: "local1".to_string(),
            recipient_host: "bad.example".to_string(),
        };

        let outcome = worker.handle(&job, payload).await.unwrap();
        assert!(matches!(outcome, JobOutcome::Completed));
    }
}
