//! Signing-key cache for the deliver workers.
//!
//! A delivery burst would otherwise hit the keypair table once per
//! recipient. Keys rotate rarely, so a short TTL bounds staleness with
//! no explicit invalidation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use sparrow_common::{AppError, AppResult};
use sparrow_db::repositories::UserKeypairRepository;

/// Default time a signing key stays cached.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// A local actor's signing material.
#[derive(Clone)]
pub struct SigningKey {
    /// Published key id.
    pub key_id: String,
    /// PEM-encoded private key.
    pub private_key_pem: String,
}

struct CacheEntry {
    key: Arc<SigningKey>,
    cached_at: Instant,
}

/// TTL cache over the keypair repository, keyed by local user id.
#[derive(Clone)]
pub struct SigningKeyCache {
    keypair_repo: UserKeypairRepository,
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    ttl: Duration,
}

impl SigningKeyCache {
    /// Create a cache with the default TTL.
    #[must_use]
    pub fn new(keypair_repo: UserKeypairRepository) -> Self {
        Self::with_ttl(keypair_repo, DEFAULT_TTL)
    }

    /// Create a cache with a custom TTL.
    #[must_use]
    pub fn with_ttl(keypair_repo: UserKeypairRepository, ttl: Duration) -> Self {
        Self {
            keypair_repo,
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// The signing key for a local actor.
    ///
    /// Errors if the actor has no keypair or the stored keypair has no
    /// private half (a remote actor's row).
    pub async fn get(&self, user_id: &str) -> AppResult<Arc<SigningKey>> {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(user_id)
                && entry.cached_at.elapsed() < self.ttl
            {
                return Ok(entry.key.clone());
            }
        }

        let keypair = self.keypair_repo.get_by_user_id(user_id).await?;
        let private_key_pem = keypair.private_key.ok_or_else(|| {
            AppError::Federation(format!("user {user_id} has no private signing key"))
        })?;

        let key = Arc::new(SigningKey {
            key_id: keypair.key_id,
            private_key_pem,
        });
        self.entries.write().await.insert(
            user_id.to_string(),
            CacheEntry {
                key: key.clone(),
                cached_at: Instant::now(),
            },
        );
        Ok(key)
    }
}
