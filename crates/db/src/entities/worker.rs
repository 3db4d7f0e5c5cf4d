//! Worker entity: a queue consumer identity with a heartbeat.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A live queue worker process. The heartbeat is what lets another
/// process reclaim jobs orphaned by a crash.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "worker")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Hostname/pid label for operator diagnostics.
    #[sea_orm(nullable)]
    pub label: Option<String>,

    pub started_at: DateTimeWithTimeZone,

    /// Refreshed periodically while the worker is alive.
    pub heartbeat_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
