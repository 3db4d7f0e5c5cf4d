//! Pre-deliver worker: fan-out of one activity into per-inbox jobs.
//!
//! Recipient computation is DB-heavy and runs once here, so a delivery
//! retry never recomputes it and one slow destination never holds up
//! the rest of the fan-out.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use sparrow_common::{AppError, AppResult, BackoffSchedule};
use sparrow_core::InstanceService;
use sparrow_db::entities::job;
use sparrow_db::repositories::{FollowingRepository, UserRepository};
use sparrow_federation::ld_signature;
use url::Url;

use crate::jobs::{DELIVER_QUEUE, DeliverJobData, PreDeliverJobData};
use crate::key_cache::SigningKeyCache;
use crate::queue::{JobEnqueuer, JobHandler, JobOutcome};
use crate::workers::retry_or_fail;

const ACTIVITY_CONTENT_TYPE: &str = "application/activity+json";

/// One remote inbox a payload will be sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DeliveryTarget {
    inbox_url: String,
    host: String,
}

/// Worker for the pre-deliver queue.
pub struct PreDeliverWorker {
    user_repo: UserRepository,
    following_repo: FollowingRepository,
    instances: InstanceService,
    key_cache: SigningKeyCache,
    enqueuer: JobEnqueuer,
    attach_ld_signatures: bool,
    backoff: BackoffSchedule,
}

impl PreDeliverWorker {
    /// Create a pre-deliver worker.
    #[must_use]
    pub fn new(
        user_repo: UserRepository,
        following_repo: FollowingRepository,
        instances: InstanceService,
        key_cache: SigningKeyCache,
        enqueuer: JobEnqueuer,
        attach_ld_signatures: bool,
    ) -> Self {
        Self {
            user_repo,
            following_repo,
            instances,
            key_cache,
            enqueuer,
            attach_ld_signatures,
            backoff: BackoffSchedule::inbox(),
        }
    }

    async fn fan_out(&self, job: &job::Model, payload: PreDeliverJobData) -> AppResult<()> {
        let mut document: Value = serde_json::from_str(&payload.serialized_activity)
            .map_err(|e| AppError::Structural(format!("stored activity unreadable: {e}")))?;
        let is_follow = document.get("type").and_then(Value::as_str) == Some("Follow");

        // Explicit recipients keep their position in front of the
        // follower fan-out; ULID job ids preserve enqueue order at
        // claim time.
        let mut targets = Vec::new();
        for recipient_id in &payload.recipient_ids {
            if let Some(target) = self.explicit_target(recipient_id).await? {
                targets.push(target);
            }
        }
        if payload.deliver_to_followers {
            targets.extend(self.follower_targets(&payload.actor_id).await?);
        }

        let targets = dedupe_targets(targets);
        let targets = self.apply_host_policy(targets, is_follow).await?;
        if targets.is_empty() {
            debug!(job_id = %job.id, "fan-out produced no targets");
            return Ok(());
        }

        // Sign and serialize the payload exactly once, not per recipient.
        if self.attach_ld_signatures {
            let key = self.key_cache.get(&payload.actor_id).await?;
            ld_signature::attach_signature(&mut document, &key.key_id, &key.private_key_pem)?;
        }
        let final_payload = serde_json::to_string(&document)
            .map_err(|e| AppError::Queue(format!("cannot serialize payload: {e}")))?;

        let target_count = targets.len();
        for target in targets {
            self.enqueuer
                .enqueue(
                    DELIVER_QUEUE,
                    &DeliverJobData {
                        inbox_url: target.inbox_url,
                        payload: final_payload.clone(),
                        content_type: ACTIVITY_CONTENT_TYPE.to_string(),
                        user_id: payload.actor_id.clone(),
                        recipient_host: target.host,
                    },
                )
                .await?;
        }
        info!(job_id = %job.id, targets = target_count, "fan-out enqueued");
        Ok(())
    }

    /// An explicit recipient's personal (or shared) inbox, skipping
    /// local and suspended users.
    async fn explicit_target(&self, recipient_id: &str) -> AppResult<Option<DeliveryTarget>> {
        let Some(user) = self.user_repo.find_by_id(recipient_id).await? else {
            debug!(recipient_id, "explicit recipient does not exist, skipping");
            return Ok(None);
        };
        if user.host.is_none() || user.is_suspended {
            return Ok(None);
        }
        let Some(inbox_url) = user.inbox.or(user.shared_inbox) else {
            return Ok(None);
        };
        Ok(host_of(&inbox_url).map(|host| DeliveryTarget { inbox_url, host }))
    }

    /// Remote followers' shared (or personal) inboxes.
    async fn follower_targets(&self, actor_id: &str) -> AppResult<Vec<DeliveryTarget>> {
        let followers = self.following_repo.find_remote_followers(actor_id).await?;
        Ok(followers
            .into_iter()
            .filter_map(|f| {
                let inbox_url = f.follower_shared_inbox.or(f.follower_inbox)?;
                let host = f.follower_host.or_else(|| host_of(&inbox_url))?;
                Some(DeliveryTarget { inbox_url, host })
            })
            .collect())
    }

    /// Drop targets on suspended, blocked, or long-unreachable hosts.
    /// A `Follow` still goes to unreachable hosts, which may recover.
    async fn apply_host_policy(
        &self,
        targets: Vec<DeliveryTarget>,
        is_follow: bool,
    ) -> AppResult<Vec<DeliveryTarget>> {
        let mut decisions: HashMap<String, bool> = HashMap::new();
        let mut surviving = Vec::with_capacity(targets.len());

        for target in targets {
            let allowed = match decisions.get(&target.host) {
                Some(allowed) => *allowed,
                None => {
                    let allowed = if self.instances.is_blocked(&target.host).await? {
                        debug!(host = %target.host, "excluding blocked host from fan-out");
                        false
                    } else if !is_follow && self.instances.is_unreachable(&target.host).await? {
                        debug!(host = %target.host, "excluding unreachable host from fan-out");
                        false
                    } else {
                        true
                    };
                    decisions.insert(target.host.clone(), allowed);
                    allowed
                }
            };
            if allowed {
                surviving.push(target);
            }
        }
        Ok(surviving)
    }
}

#[async_trait]
impl JobHandler for PreDeliverWorker {
    type Payload = PreDeliverJobData;

    async fn handle(&self, job: &job::Model, payload: PreDeliverJobData) -> AppResult<JobOutcome> {
        match self.fan_out(job, payload).await {
            Ok(()) => Ok(JobOutcome::Completed),
            Err(e) if e.is_retryable() => retry_or_fail(job, &self.backoff, &e),
            Err(e) => Err(e),
        }
    }
}

/// Deduplicate by (inbox, host), keeping first occurrence order.
fn dedupe_targets(targets: Vec<DeliveryTarget>) -> Vec<DeliveryTarget> {
    let mut seen = HashSet::new();
    targets
        .into_iter()
        .filter(|t| seen.insert((t.inbox_url.clone(), t.host.clone())))
        .collect()
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::jobs::PRE_DELIVER_QUEUE;
    use chrono::{Duration as ChronoDuration, Utc};
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase};
    use sparrow_common::config::FederationConfig;
    use sparrow_db::entities::{following, instance, user};
    use sparrow_db::repositories::{InstanceRepository, JobRepository, UserKeypairRepository};
    use std::sync::Arc;

    fn remote_user(id: &str, inbox: &str, host: &str) -> user::Model {
        let now = Utc::now().fixed_offset();
        user::Model {
            id: id.to_string(),
            username: id.to_string(),
            username_lower: id.to_string(),
            host: Some(host.to_string()),
            name: None,
            is_suspended: false,
            inbox: Some(inbox.to_string()),
            shared_inbox: None,
            uri: Some(format!("https://{host}/users/{id}")),
            last_fetched_at: None,
            created_at: now,
            updated_at: None,
        }
    }

    fn follower_edge(inbox: &str, host: &str) -> following::Model {
        following::Model {
            id: "f1".to_string(),
            follower_id: "remote1".to_string(),
            followee_id: "local1".to_string(),
            follower_host: Some(host.to_string()),
            follower_inbox: None,
            follower_shared_inbox: Some(inbox.to_string()),
            created_at: Utc::now().fixed_offset(),
        }
    }

    fn silent_instance(host: &str) -> instance::Model {
        instance::Model {
            id: "i1".to_string(),
            host: host.to_string(),
            is_suspended: false,
            is_not_responding: true,
            latest_status: None,
            last_communicated_at: Some(
                (Utc::now() - ChronoDuration::days(30)).fixed_offset(),
            ),
            created_at: Utc::now().fixed_offset(),
            updated_at: None,
        }
    }

    fn queued_job(queue: &str) -> job::Model {
        job::Model {
            id: "01jdeliver".to_string(),
            queue: queue.to_string(),
            status: job::JobStatus::Queued,
            payload: serde_json::json!({}),
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

    fn running_job(payload: serde_json::Value) -> job::Model {
        job::Model {
            id: "01jpre".to_string(),
            queue: PRE_DELIVER_QUEUE.to_string(),
            status: job::JobStatus::Running,
            payload,
            retry_count: 0,
            delayed_until: None,
            worker_id: Some("w1".to_string()),
            exception_message: None,
            exception_source: None,
            exception_stack: None,
            created_at: Utc::now().fixed_offset(),
            updated_at: Utc::now().fixed_offset(),
        }
    }

    fn worker_over(db: DatabaseConnection, federation: &FederationConfig) -> PreDeliverWorker {
        let db = Arc::new(db);
        PreDeliverWorker::new(
            UserRepository::new(Arc::clone(&db)),
            FollowingRepository::new(Arc::clone(&db)),
            InstanceService::new(InstanceRepository::new(Arc::clone(&db)), federation),
            SigningKeyCache::new(UserKeypairRepository::new(Arc::clone(&db))),
            JobEnqueuer::new(JobRepository::new(db)),
            false,
        )
    }

    fn payload(
        activity: &serde_json::Value,
        recipient_ids: Vec<String>,
        deliver_to_followers: bool,
    ) -> PreDeliverJobData {
        PreDeliverJobData {
            serialized_activity: activity.to_string(),
            actor_id: "local1".to_string(),
            recipient_ids,
            deliver_to_followers,
        }
    }

    #[tokio::test]
    async fn test_fan_out_enqueues_explicit_then_followers() {
        // User lookup, follower lookup, two instance checks for the
        // shared host, then two deliver-job inserts.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![remote_user(
                "u2",
                "https://b.example/users/u2/inbox",
                "b.example",
            )]])
            .append_query_results([vec![follower_edge("https://b.example/inbox", "b.example")]])
            .append_query_results([
                Vec::<instance::Model>::new(),
                Vec::<instance::Model>::new(),
            ])
            .append_query_results([
                vec![queued_job(DELIVER_QUEUE)],
                vec![queued_job(DELIVER_QUEUE)],
            ])
            .into_connection();
        let worker = worker_over(db, &FederationConfig::default());

        let activity = serde_json::json!({"type": "Create", "id": "https://a.example/n/1"});
        let job = running_job(serde_json::json!({}));
        let outcome = worker
            .handle(&job, payload(&activity, vec!["u2".to_string()], true))
            .await
            .unwrap();
        assert!(matches!(outcome, JobOutcome::Completed));
    }

    #[tokio::test]
    async fn test_fan_out_drops_blocked_host_quietly() {
        // Host is on the block list, so only the user lookup hits the
        // database and nothing is enqueued.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![remote_user(
                "u2",
                "https://bad.example/users/u2/inbox",
                "bad.example",
            )]])
            .into_connection();
        let federation = FederationConfig {
            blocked_hosts: vec!["bad.example".to_string()],
            ..FederationConfig::default()
        };
        let worker = worker_over(db, &federation);

        let activity = serde_json::json!({"type": "Create"});
        let job = running_job(serde_json::json!({}));
        let outcome = worker
            .handle(&job, payload(&activity, vec!["u2".to_string()], false))
            .await
            .unwrap();
        assert!(matches!(outcome, JobOutcome::Completed));
    }

    #[tokio::test]
    async fn test_suspended_follower_host_gets_no_job() {
        // Two follower hosts, one suspended: exactly one deliver job.
        let suspended = instance::Model {
            is_suspended: true,
            is_not_responding: false,
            ..silent_instance("down.example")
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![
                follower_edge("https://down.example/inbox", "down.example"),
                follower_edge("https://up.example/inbox", "up.example"),
            ]])
            .append_query_results([
                vec![suspended],
                Vec::<instance::Model>::new(),
                Vec::<instance::Model>::new(),
            ])
            .append_query_results([vec![queued_job(DELIVER_QUEUE)]])
            .into_connection();
        let worker = worker_over(db, &FederationConfig::default());

        let activity = serde_json::json!({"type": "Create"});
        let job = running_job(serde_json::json!({}));
        let outcome = worker
            .handle(&job, payload(&activity, Vec::new(), true))
            .await
            .unwrap();
        assert!(matches!(outcome, JobOutcome::Completed));
    }

    #[tokio::test]
    async fn test_fan_out_skips_unreachable_host() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![remote_user(
                "u2",
                "https://quiet.example/users/u2/inbox",
                "quiet.example",
            )]])
            .append_query_results([
                vec![silent_instance("quiet.example")],
                vec![silent_instance("quiet.example")],
            ])
            .into_connection();
        let worker = worker_over(db, &FederationConfig::default());

        let activity = serde_json::json!({"type": "Create"});
        let job = running_job(serde_json::json!({}));
        let outcome = worker
            .handle(&job, payload(&activity, vec!["u2".to_string()], false))
            .await
            .unwrap();
        assert!(matches!(outcome, JobOutcome::Completed));
    }

    #[tokio::test]
    async fn test_follow_still_delivered_to_unreachable_host() {
        // Only the suspension check runs; a Follow skips the
        // reachability exclusion and the deliver job is enqueued.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![remote_user(
                "u2",
                "https://quiet.example/users/u2/inbox",
                "quiet.example",
            )]])
            .append_query_results([vec![silent_instance("quiet.example")]])
            .append_query_results([vec![queued_job(DELIVER_QUEUE)]])
            .into_connection();
        let worker = worker_over(db, &FederationConfig::default());

        let activity = serde_json::json!({"type": "Follow", "actor": "https://x/u/1"});
        let job = running_job(serde_json::json!({}));
        let outcome = worker
            .handle(&job, payload(&activity, vec!["u2".to_string()], false))
            .await
            .unwrap();
        assert!(matches!(outcome, JobOutcome::Completed));
    }

    #[test]
    fn test_unreadable_activity_is_terminal() {
        let err = serde_json::from_str::<Value>("{not json")
            .map_err(|e| AppError::Structural(format!("stored activity unreadable: {e}")))
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    fn target(inbox: &str, host: &str) -> DeliveryTarget {
        DeliveryTarget {
            inbox_url: inbox.to_string(),
            host: host.to_string(),
        }
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let targets = vec![
            target("https://a.example/users/1/inbox", "a.example"),
            target("https://b.example/inbox", "b.example"),
            target("https://a.example/users/1/inbox", "a.example"),
            target("https://b.example/inbox", "b.example"),
        ];

        let deduped = dedupe_targets(targets);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].host, "a.example");
        assert_eq!(deduped[1].host, "b.example");
    }

    #[test]
    fn test_dedupe_distinguishes_inboxes_on_same_host() {
        let targets = vec![
            target("https://a.example/users/1/inbox", "a.example"),
            target("https://a.example/users/2/inbox", "a.example"),
        ];
        assert_eq!(dedupe_targets(targets).len(), 2);
    }

    #[test]
    fn test_host_of() {
        assert_eq!(
            host_of("https://B.example/inbox"),
            Some("b.example".to_string())
        );
        assert_eq!(host_of("not a url"), None);
    }
}
