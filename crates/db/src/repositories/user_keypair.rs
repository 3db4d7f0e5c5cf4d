//! User keypair repository.

use std::sync::Arc;

use crate::entities::{UserKeypair, user_keypair};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use sparrow_common::{AppError, AppResult};

/// Keypair repository for database operations.
#[derive(Clone)]
pub struct UserKeypairRepository {
    db: Arc<DatabaseConnection>,
}

impl UserKeypairRepository {
    /// Create a new keypair repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a keypair by user ID.
    pub async fn find_by_user_id(&self, user_id: &str) -> AppResult<Option<user_keypair::Model>> {
        UserKeypair::find_by_id(user_id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a keypair by user ID, or error if not found.
    pub async fn get_by_user_id(&self, user_id: &str) -> AppResult<user_keypair::Model> {
        self.find_by_user_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Keypair not found for user: {user_id}")))
    }

    /// Find a key record by key ID.
    pub async fn find_by_key_id(&self, key_id: &str) -> AppResult<Option<user_keypair::Model>> {
        UserKeypair::find()
            .filter(user_keypair::Column::KeyId.eq(key_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a keypair record.
    pub async fn create(&self, model: user_keypair::ActiveModel) -> AppResult<user_keypair::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Replace the cached public key for an actor (key rotation).
    pub async fn update_public_key(
        &self,
        user_id: &str,
        key_id: &str,
        public_key_pem: &str,
    ) -> AppResult<()> {
        let model = user_keypair::ActiveModel {
            user_id: Set(user_id.to_string()),
            key_id: Set(key_id.to_string()),
            public_key: Set(public_key_pem.to_string()),
            updated_at: Set(Some(Utc::now().fixed_offset())),
            ..Default::default()
        };

        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}
