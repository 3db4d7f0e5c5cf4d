//! Worker repository.

use std::sync::Arc;

use crate::entities::{Worker, worker};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use sparrow_common::{AppError, AppResult};

/// Worker repository for database operations.
#[derive(Clone)]
pub struct WorkerRepository {
    db: Arc<DatabaseConnection>,
}

impl WorkerRepository {
    /// Create a new worker repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Register a worker at process start.
    pub async fn register(&self, id: &str, label: Option<&str>) -> AppResult<worker::Model> {
        let now = Utc::now().fixed_offset();

        let model = worker::ActiveModel {
            id: Set(id.to_string()),
            label: Set(label.map(ToString::to_string)),
            started_at: Set(now),
            heartbeat_at: Set(now),
        };

        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Refresh the heartbeat timestamp.
    pub async fn heartbeat(&self, id: &str) -> AppResult<()> {
        let model = worker::ActiveModel {
            id: Set(id.to_string()),
            heartbeat_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        };

        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Remove a worker at shutdown.
    pub async fn deregister(&self, id: &str) -> AppResult<()> {
        Worker::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}
