//! Job entity: one row per queued unit of work.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a job.
#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum JobStatus {
    /// Eligible for claiming.
    #[sea_orm(string_value = "queued")]
    Queued,
    /// Scheduled for a retry; eligible once `delayed_until` passes.
    #[sea_orm(string_value = "delayed")]
    Delayed,
    /// Claimed by a worker.
    #[sea_orm(string_value = "running")]
    Running,
    /// Finished successfully (terminal).
    #[sea_orm(string_value = "completed")]
    Completed,
    /// Exhausted its retries or failed terminally (terminal).
    #[sea_orm(string_value = "failed")]
    Failed,
}

/// A persisted queue job. All logical queues share this table,
/// distinguished by `queue` name. A job is owned by the worker named in
/// `worker_id` while Running; the claim query is the only way to take
/// ownership.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "job")]
pub struct Model {
    /// ULID, so ids sort in insertion order.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Logical queue name ("inbox", "pre_deliver", "deliver").
    pub queue: String,

    pub status: JobStatus,

    /// Queue-specific payload, a stable JSON contract across restarts.
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: Json,

    /// Number of attempts that have run. Only ever increases.
    #[sea_orm(default_value = 0)]
    pub retry_count: i32,

    /// Not eligible for claiming before this time.
    #[sea_orm(nullable)]
    pub delayed_until: Option<DateTimeWithTimeZone>,

    /// Worker currently holding the job (Running only).
    #[sea_orm(nullable)]
    pub worker_id: Option<String>,

    /// Captured diagnostics of the last failure.
    #[sea_orm(column_type = "Text", nullable)]
    pub exception_message: Option<String>,

    #[sea_orm(nullable)]
    pub exception_source: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub exception_stack: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
