//! Instance repository for federation reachability tracking.

use std::sync::Arc;

use crate::entities::{Instance, instance};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use sparrow_common::{AppError, AppResult, IdGenerator};

/// Instance repository for database operations.
#[derive(Clone)]
pub struct InstanceRepository {
    db: Arc<DatabaseConnection>,
    id_gen: IdGenerator,
}

impl InstanceRepository {
    /// Create a new instance repository.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            id_gen: IdGenerator::new(),
        }
    }

    /// Find an instance by hostname.
    pub async fn find_by_host(&self, host: &str) -> AppResult<Option<instance::Model>> {
        Instance::find()
            .filter(instance::Column::Host.eq(host.to_lowercase()))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find or create an instance row for a hostname.
    pub async fn find_or_create(&self, host: &str) -> AppResult<instance::Model> {
        let host_lower = host.to_lowercase();
        if let Some(instance) = self.find_by_host(&host_lower).await? {
            return Ok(instance);
        }

        let model = instance::ActiveModel {
            id: Set(self.id_gen.generate()),
            host: Set(host_lower),
            created_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        };

        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Check if an instance is suspended.
    pub async fn is_suspended(&self, host: &str) -> AppResult<bool> {
        let instance = self.find_by_host(host).await?;
        Ok(instance.is_some_and(|i| i.is_suspended))
    }

    /// Suspend an instance.
    pub async fn suspend(&self, host: &str) -> AppResult<instance::Model> {
        let instance = self.find_or_create(host).await?;
        let now = Utc::now().fixed_offset();

        let model = instance::ActiveModel {
            id: Set(instance.id),
            is_suspended: Set(true),
            updated_at: Set(Some(now)),
            ..Default::default()
        };

        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Record the outcome of an exchange with an instance: latest HTTP
    /// status, responding flag, and a fresh `last_communicated_at` on
    /// success.
    pub async fn record_exchange(
        &self,
        host: &str,
        http_status: Option<u16>,
        is_failure: bool,
    ) -> AppResult<()> {
        let instance = self.find_or_create(host).await?;
        let now = Utc::now().fixed_offset();

        let mut model = instance::ActiveModel {
            id: Set(instance.id),
            latest_status: Set(http_status.map(i32::from)),
            is_not_responding: Set(is_failure),
            updated_at: Set(Some(now)),
            ..Default::default()
        };
        if !is_failure {
            model.last_communicated_at = Set(Some(now));
        }

        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Whether an instance has been silent since before the cutoff.
    /// Instances we have never spoken to are not treated as unreachable.
    pub async fn is_unreachable_since(
        &self,
        host: &str,
        cutoff: DateTime<Utc>,
    ) -> AppResult<bool> {
        let Some(instance) = self.find_by_host(host).await? else {
            return Ok(false);
        };
        if !instance.is_not_responding {
            return Ok(false);
        }
        Ok(instance
            .last_communicated_at
            .is_none_or(|at| at < cutoff.fixed_offset()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn instance_row(host: &str, suspended: bool) -> instance::Model {
        instance::Model {
            id: "01hinstance".to_string(),
            host: host.to_string(),
            is_suspended: suspended,
            is_not_responding: false,
            latest_status: Some(200),
            last_communicated_at: Some(Utc::now().fixed_offset()),
            created_at: Utc::now().fixed_offset(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_is_suspended() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![instance_row("bad.example", true)]])
            .append_query_results([Vec::<instance::Model>::new()])
            .into_connection();

        let repo = InstanceRepository::new(Arc::new(db));
        assert!(repo.is_suspended("bad.example").await.unwrap());
        assert!(!repo.is_suspended("unknown.example").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_host_not_unreachable() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<instance::Model>::new()])
            .into_connection();

        let repo = InstanceRepository::new(Arc::new(db));
        let unreachable = repo
            .is_unreachable_since("new.example", Utc::now())
            .await
            .unwrap();
        assert!(!unreachable);
    }
}
