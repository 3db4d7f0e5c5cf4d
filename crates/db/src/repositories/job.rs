//! Job repository: the storage primitives every queue is built on.
//!
//! All cross-worker coordination goes through this table. The claim is a
//! single atomic `UPDATE ... FOR UPDATE SKIP LOCKED` statement so that a
//! job is handed to exactly one worker even across multiple server
//! processes sharing one database.

use std::sync::Arc;

use crate::entities::{Job, job};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    PaginatorTrait, QueryFilter, Set, Statement,
};
use sparrow_common::{AppError, AppResult, IdGenerator};

/// Job repository for database operations.
#[derive(Clone)]
pub struct JobRepository {
    db: Arc<DatabaseConnection>,
    id_gen: IdGenerator,
}

impl JobRepository {
    /// Create a new job repository.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            id_gen: IdGenerator::new(),
        }
    }

    /// Insert a Queued job. Never blocks on downstream processing and is
    /// safe to call from any request-handling path.
    pub async fn enqueue(&self, queue: &str, payload: serde_json::Value) -> AppResult<job::Model> {
        let now = Utc::now().fixed_offset();

        let model = job::ActiveModel {
            id: Set(self.id_gen.generate()),
            queue: Set(queue.to_string()),
            status: Set(job::JobStatus::Queued),
            payload: Set(payload),
            retry_count: Set(0),
            delayed_until: Set(None),
            worker_id: Set(None),
            exception_message: Set(None),
            exception_source: Set(None),
            exception_stack: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Atomically claim the oldest eligible job of a queue for `worker_id`,
    /// marking it Running. Returns `None` when nothing is eligible.
    ///
    /// Eligible means Queued, or Delayed with `delayed_until` in the past.
    /// `SKIP LOCKED` keeps concurrent claimers from blocking each other and
    /// guarantees at most one worker wins the row.
    pub async fn claim_next(&self, queue: &str, worker_id: &str) -> AppResult<Option<job::Model>> {
        let sql = r#"
            UPDATE "job"
            SET "status" = 'running', "worker_id" = $1, "updated_at" = NOW()
            WHERE "id" = (
                SELECT "id" FROM "job"
                WHERE "queue" = $2
                  AND ("status" = 'queued' OR "status" = 'delayed')
                  AND ("delayed_until" IS NULL OR "delayed_until" <= NOW())
                ORDER BY "id"
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
        "#;

        Job::find()
            .from_raw_sql(Statement::from_sql_and_values(
                DbBackend::Postgres,
                sql,
                [worker_id.into(), queue.into()],
            ))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Mark a job Completed.
    pub async fn mark_completed(&self, id: &str) -> AppResult<()> {
        let model = job::ActiveModel {
            id: Set(id.to_string()),
            status: Set(job::JobStatus::Completed),
            worker_id: Set(None),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        };

        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Mark a job terminally Failed, persisting the captured diagnostics.
    pub async fn mark_failed(
        &self,
        id: &str,
        message: &str,
        source: Option<&str>,
        stack: Option<&str>,
    ) -> AppResult<()> {
        let model = job::ActiveModel {
            id: Set(id.to_string()),
            status: Set(job::JobStatus::Failed),
            worker_id: Set(None),
            exception_message: Set(Some(message.to_string())),
            exception_source: Set(source.map(ToString::to_string)),
            exception_stack: Set(stack.map(ToString::to_string)),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        };

        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Schedule a retry: Delayed status, future `delayed_until`, and an
    /// incremented retry count (which only ever increases).
    pub async fn schedule_retry(
        &self,
        id: &str,
        delayed_until: DateTime<Utc>,
        message: &str,
    ) -> AppResult<()> {
        let sql = r#"
            UPDATE "job"
            SET "status" = 'delayed',
                "worker_id" = NULL,
                "retry_count" = "retry_count" + 1,
                "delayed_until" = $1,
                "exception_message" = $2,
                "updated_at" = NOW()
            WHERE "id" = $3
        "#;

        self.db
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                sql,
                [
                    delayed_until.fixed_offset().into(),
                    message.into(),
                    id.into(),
                ],
            ))
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Reset Running jobs whose worker heartbeat went stale back to Queued
    /// so another worker can retry them. Returns the number reclaimed.
    pub async fn reclaim_stalled(&self, heartbeat_cutoff: DateTime<Utc>) -> AppResult<u64> {
        let sql = r#"
            UPDATE "job"
            SET "status" = 'queued', "worker_id" = NULL, "updated_at" = NOW()
            WHERE "status" = 'running'
              AND ("worker_id" IS NULL OR "worker_id" NOT IN (
                  SELECT "id" FROM "worker" WHERE "heartbeat_at" > $1
              ))
        "#;

        let result = self
            .db
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                sql,
                [heartbeat_cutoff.fixed_offset().into()],
            ))
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }

    /// Delete terminal jobs older than the cutoff (operator retention).
    pub async fn delete_terminal_before(
        &self,
        status: job::JobStatus,
        cutoff: DateTime<Utc>,
    ) -> AppResult<u64> {
        let result = Job::delete_many()
            .filter(job::Column::Status.eq(status))
            .filter(job::Column::UpdatedAt.lt(cutoff.fixed_offset()))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected)
    }

    /// Find a job by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<job::Model>> {
        Job::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count jobs of a queue in a given status (operator inspection).
    pub async fn count_by_status(&self, queue: &str, status: job::JobStatus) -> AppResult<u64> {
        Job::find()
            .filter(job::Column::Queue.eq(queue))
            .filter(job::Column::Status.eq(status))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
