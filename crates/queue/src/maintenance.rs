//! Periodic queue maintenance: stalled-job reclaim and retention sweeps.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use sparrow_common::config::QueueConfig;
use sparrow_db::entities::job::JobStatus;
use sparrow_db::repositories::JobRepository;

/// How often terminal jobs are swept.
const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Spawns the maintenance loops for one queue instance.
pub struct QueueMaintenance {
    job_repo: JobRepository,
    claim_timeout: Duration,
    completed_retention: chrono::Duration,
    failed_retention: chrono::Duration,
}

impl QueueMaintenance {
    /// Create maintenance loops from queue configuration.
    #[must_use]
    pub fn new(job_repo: JobRepository, config: &QueueConfig) -> Self {
        Self {
            job_repo,
            claim_timeout: Duration::from_secs(config.claim_timeout_secs),
            completed_retention: chrono::Duration::days(i64::from(
                config.completed_retention_days,
            )),
            failed_retention: chrono::Duration::days(i64::from(config.failed_retention_days)),
        }
    }

    /// Spawn the reclaim and retention loops. They run until the
    /// shutdown channel flips to `true`.
    #[must_use]
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let reclaim = tokio::spawn(reclaim_loop(
            self.job_repo.clone(),
            self.claim_timeout,
            shutdown.clone(),
        ));
        let retention = tokio::spawn(retention_loop(
            self.job_repo,
            self.completed_retention,
            self.failed_retention,
            shutdown,
        ));
        vec![reclaim, retention]
    }
}

/// Jobs stuck in `running` whose worker stopped heartbeating go back
/// to `queued` so another worker can pick them up.
async fn reclaim_loop(
    job_repo: JobRepository,
    claim_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(claim_timeout);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let cutoff = Utc::now()
                    - chrono::Duration::from_std(claim_timeout)
                        .unwrap_or_else(|_| chrono::Duration::seconds(300));
                match job_repo.reclaim_stalled(cutoff).await {
                    Ok(0) => {}
                    Ok(n) => info!(reclaimed = n, "requeued stalled jobs"),
                    Err(e) => error!(error = %e, "stalled-job reclaim failed"),
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

async fn retention_loop(
    job_repo: JobRepository,
    completed_retention: chrono::Duration,
    failed_retention: chrono::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(RETENTION_SWEEP_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sweep(&job_repo, JobStatus::Completed, completed_retention).await;
                sweep(&job_repo, JobStatus::Failed, failed_retention).await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

async fn sweep(job_repo: &JobRepository, status: JobStatus, retention: chrono::Duration) {
    let cutoff = Utc::now() - retention;
    match job_repo.delete_terminal_before(status, cutoff).await {
        Ok(0) => {}
        Ok(n) => info!(deleted = n, ?status, "swept terminal jobs"),
        Err(e) => error!(error = %e, ?status, "retention sweep failed"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    use super::*;

    #[tokio::test]
    async fn test_sweep_runs_once_per_terminal_status() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 12,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
            ])
            .into_connection();

        let repo = JobRepository::new(Arc::new(db));
        let status = JobStatus::Completed;
        sweep(&repo, status, chrono::Duration::days(7)).await;
        sweep(&repo, status, chrono::Duration::days(7)).await;
    }
}
