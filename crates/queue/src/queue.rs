//! Generic durable job queue.
//!
//! Each queue runs a fixed pool of worker loops over one shared job
//! table. Claiming is a single atomic storage operation, so any number
//! of loops in any number of processes can share a queue. Cross-worker
//! coordination happens only through the table.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use sparrow_common::{AppError, AppResult};
use sparrow_db::entities::job;
use sparrow_db::repositories::JobRepository;

/// What a handler decided about its job.
#[derive(Debug)]
pub enum JobOutcome {
    /// The job is done.
    Completed,
    /// The handler schedules its own retry; the queue must honor it
    /// rather than failing the job.
    Retry {
        /// When the job becomes eligible again.
        delay_until: DateTime<Utc>,
        /// Why the attempt failed, recorded on the job row.
        reason: String,
    },
}

/// A typed handler for one queue.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    /// Payload type the queue deserializes for this handler.
    type Payload: DeserializeOwned + Send;

    /// Process one claimed job.
    ///
    /// Returning `Err` fails the job terminally with diagnostics;
    /// transient failures must come back as [`JobOutcome::Retry`].
    async fn handle(&self, job: &job::Model, payload: Self::Payload) -> AppResult<JobOutcome>;
}

/// Inserts jobs onto named queues.
#[derive(Clone)]
pub struct JobEnqueuer {
    job_repo: JobRepository,
}

impl JobEnqueuer {
    /// Create an enqueuer over the job table.
    #[must_use]
    pub const fn new(job_repo: JobRepository) -> Self {
        Self { job_repo }
    }

    /// Insert one Queued job. Never blocks on downstream processing.
    pub async fn enqueue<T: serde::Serialize>(
        &self,
        queue: &str,
        payload: &T,
    ) -> AppResult<job::Model> {
        let payload = serde_json::to_value(payload)
            .map_err(|e| AppError::Queue(format!("unserializable payload: {e}")))?;
        self.job_repo.enqueue(queue, payload).await
    }
}

/// A queue instance: a name, a handler, and a worker pool size.
pub struct JobQueue<H: JobHandler> {
    name: &'static str,
    handler: Arc<H>,
    job_repo: JobRepository,
    worker_id: String,
    parallelism: usize,
    poll_interval: Duration,
}

impl<H: JobHandler> JobQueue<H> {
    /// Create a queue instance.
    #[must_use]
    pub fn new(
        name: &'static str,
        handler: H,
        job_repo: JobRepository,
        worker_id: String,
        parallelism: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            name,
            handler: Arc::new(handler),
            job_repo,
            worker_id,
            parallelism: parallelism.max(1),
            poll_interval,
        }
    }

    /// Spawn the worker loops. They run until `shutdown` flips to true.
    #[must_use]
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        info!(
            queue = self.name,
            parallelism = self.parallelism,
            "starting queue workers"
        );
        (0..self.parallelism)
            .map(|index| {
                let worker = QueueWorker {
                    name: self.name,
                    handler: self.handler.clone(),
                    job_repo: self.job_repo.clone(),
                    worker_id: self.worker_id.clone(),
                    poll_interval: self.poll_interval,
                };
                let shutdown = shutdown.clone();
                tokio::spawn(async move { worker.run(index, shutdown).await })
            })
            .collect()
    }
}

struct QueueWorker<H: JobHandler> {
    name: &'static str,
    handler: Arc<H>,
    job_repo: JobRepository,
    worker_id: String,
    poll_interval: Duration,
}

impl<H: JobHandler> QueueWorker<H> {
    async fn run(&self, index: usize, mut shutdown: watch::Receiver<bool>) {
        debug!(queue = self.name, index, "worker loop started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.job_repo.claim_next(self.name, &self.worker_id).await {
                Ok(Some(claimed)) => {
                    // One job's failure never takes the loop down.
                    self.process(claimed).await;
                }
                Ok(None) => {
                    // Queue drained; wait for the next poll or shutdown.
                    tokio::select! {
                        _ = tokio::time::sleep(self.poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(e) => {
                    warn!(queue = self.name, error = %e, "claim failed, backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(self.poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }
        debug!(queue = self.name, index, "worker loop stopped");
    }

    async fn process(&self, claimed: job::Model) {
        let job_id = claimed.id.clone();

        let payload: H::Payload = match serde_json::from_value(claimed.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                // A payload this process cannot read will not become
                // readable on retry.
                error!(queue = self.name, job_id = %job_id, error = %e, "undeserializable payload");
                self.finalize_failed(&job_id, &format!("undeserializable payload: {e}"), None)
                    .await;
                return;
            }
        };

        match self.handler.handle(&claimed, payload).await {
            Ok(JobOutcome::Completed) => {
                if let Err(e) = self.job_repo.mark_completed(&job_id).await {
                    error!(queue = self.name, job_id = %job_id, error = %e, "failed to complete job");
                }
            }
            Ok(JobOutcome::Retry {
                delay_until,
                reason,
            }) => {
                debug!(
                    queue = self.name,
                    job_id = %job_id,
                    delay_until = %delay_until,
                    "handler scheduled retry"
                );
                if let Err(e) = self
                    .job_repo
                    .schedule_retry(&job_id, delay_until, &reason)
                    .await
                {
                    error!(queue = self.name, job_id = %job_id, error = %e, "failed to schedule retry");
                }
            }
            Err(e) => {
                warn!(queue = self.name, job_id = %job_id, error = %e, "job failed terminally");
                let source = format!("{}#{}", self.name, claimed.retry_count);
                self.finalize_failed(&job_id, &e.to_string(), Some(&source))
                    .await;
            }
        }
    }

    async fn finalize_failed(&self, job_id: &str, message: &str, source: Option<&str>) {
        if let Err(e) = self.job_repo.mark_failed(job_id, message, source, None).await {
            error!(queue = self.name, job_id = %job_id, error = %e, "failed to mark job failed");
        }
    }
}
