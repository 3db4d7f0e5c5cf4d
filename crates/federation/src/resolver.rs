//! Remote actor and signing-key resolution.
//!
//! Maps a signature `keyId` (or an activity's `actor` IRI) to a public
//! key, consulting an in-process TTL cache, then the database, then the
//! remote server. Fetched actors are persisted so subsequent requests
//! stay off the network.

use chrono::Utc;
use sea_orm::Set;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use sparrow_common::{AppError, AppResult, IdGenerator};
use sparrow_db::entities::{user, user_keypair};
use sparrow_db::repositories::{UserKeypairRepository, UserRepository};

use crate::client::ApClient;

/// How long a resolved public key stays cached.
const KEY_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

/// A resolved signing key and its owning actor.
#[derive(Debug, Clone)]
pub struct ResolvedKey {
    /// The key id, as published by the owner.
    pub key_id: String,
    /// Local row id of the owning actor.
    pub owner_id: String,
    /// The owner's `ActivityPub` URI.
    pub owner_uri: String,
    /// Owner host; `None` means the owner is a local actor.
    pub owner_host: Option<String>,
    /// PEM-encoded public key.
    pub public_key_pem: String,
}

impl ResolvedKey {
    /// Whether the owning actor is one of ours.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        self.owner_host.is_none()
    }
}

struct CacheEntry {
    key: ResolvedKey,
    cached_at: Instant,
}

/// Resolves actors and signing keys for inbound validation and LD
/// signature checks.
#[derive(Clone)]
pub struct ActorResolver {
    user_repo: UserRepository,
    keypair_repo: UserKeypairRepository,
    client: ApClient,
    local_host: String,
    id_gen: IdGenerator,
    key_cache: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl ActorResolver {
    /// Create a new resolver.
    #[must_use]
    pub fn new(
        user_repo: UserRepository,
        keypair_repo: UserKeypairRepository,
        client: ApClient,
        local_host: String,
    ) -> Self {
        Self {
            user_repo,
            keypair_repo,
            client,
            local_host: local_host.to_lowercase(),
            id_gen: IdGenerator::new(),
            key_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Whether a host is this instance.
    #[must_use]
    pub fn is_local_host(&self, host: &str) -> bool {
        host.eq_ignore_ascii_case(&self.local_host)
    }

    /// Find a known actor by URI or fetch and persist it.
    pub async fn resolve_actor(&self, actor_url: &Url) -> AppResult<user::Model> {
        if let Some(existing) = self.user_repo.find_by_uri(actor_url.as_str()).await? {
            debug!(actor = %actor_url, "actor known locally");
            return Ok(existing);
        }

        info!(actor = %actor_url, "fetching remote actor");
        let document = self
            .client
            .fetch_actor(actor_url.as_str())
            .await
            .map_err(|e| AppError::Federation(format!("failed to fetch actor: {e}")))?;

        self.persist_remote_actor(&document, actor_url).await
    }

    /// Like [`Self::resolve_actor`] but treats an unresolvable actor as
    /// absent instead of an error. Used for `Delete` activities whose
    /// subject is usually already tombstoned remotely.
    pub async fn try_resolve_actor(&self, actor_url: &Url) -> AppResult<Option<user::Model>> {
        if let Some(existing) = self.user_repo.find_by_uri(actor_url.as_str()).await? {
            return Ok(Some(existing));
        }
        match self.client.fetch_actor(actor_url.as_str()).await {
            Ok(document) => Ok(Some(self.persist_remote_actor(&document, actor_url).await?)),
            Err(e) => {
                debug!(actor = %actor_url, error = %e, "actor unresolvable");
                Ok(None)
            }
        }
    }

    /// Resolve the public key for a signature `keyId`.
    pub async fn resolve_key(&self, key_id: &str) -> AppResult<Option<ResolvedKey>> {
        if let Some(cached) = self.cached_key(key_id).await {
            return Ok(Some(cached));
        }

        if let Some(resolved) = self.key_from_db(key_id).await? {
            self.cache_key(resolved.clone()).await;
            return Ok(Some(resolved));
        }

        // The keyId conventionally points at the actor document with a
        // fragment; resolving the actor stores the key as a side effect.
        let actor_url = actor_url_from_key_id(key_id)?;
        if self.user_repo.find_by_uri(actor_url.as_str()).await?.is_none() {
            match self.client.fetch_actor(actor_url.as_str()).await {
                Ok(document) => {
                    self.persist_remote_actor(&document, &actor_url).await?;
                }
                Err(e) => {
                    debug!(key_id = %key_id, error = %e, "key owner unresolvable");
                    return Ok(None);
                }
            }
        }

        let resolved = self.key_from_db(key_id).await?;
        if let Some(key) = &resolved {
            self.cache_key(key.clone()).await;
        }
        Ok(resolved)
    }

    /// Force a refetch of the key owner's actor document and return the
    /// current key. Called once per request after a failed verification
    /// to pick up rotated keys.
    pub async fn refresh_key(&self, key_id: &str) -> AppResult<Option<ResolvedKey>> {
        self.key_cache.write().await.remove(key_id);

        let actor_url = actor_url_from_key_id(key_id)?;
        let document = match self.client.fetch_actor(actor_url.as_str()).await {
            Ok(document) => document,
            Err(e) => {
                warn!(key_id = %key_id, error = %e, "key refresh fetch failed");
                return Ok(None);
            }
        };

        let Some((published_key_id, public_key_pem)) = extract_public_key(&document) else {
            return Ok(None);
        };

        if let Some(owner) = self.user_repo.find_by_uri(actor_url.as_str()).await? {
            self.keypair_repo
                .update_public_key(&owner.id, &published_key_id, &public_key_pem)
                .await?;
            self.user_repo.touch_last_fetched(&owner.id).await?;
        } else {
            self.persist_remote_actor(&document, &actor_url).await?;
        }

        let resolved = self.key_from_db(&published_key_id).await?;
        if let Some(key) = &resolved {
            self.cache_key(key.clone()).await;
        }
        Ok(resolved)
    }

    /// Resolve the signing key published by an actor URI (LD signature
    /// verification resolves the key from `actor`, not from `keyId`).
    pub async fn key_for_actor(&self, actor_url: &Url) -> AppResult<Option<ResolvedKey>> {
        let Some(actor) = self.try_resolve_actor(actor_url).await? else {
            return Ok(None);
        };
        let Some(keypair) = self.keypair_repo.find_by_user_id(&actor.id).await? else {
            return Ok(None);
        };
        Ok(Some(resolved_from_rows(&actor, &keypair)))
    }

    async fn cached_key(&self, key_id: &str) -> Option<ResolvedKey> {
        let cache = self.key_cache.read().await;
        cache
            .get(key_id)
            .filter(|entry| entry.cached_at.elapsed() < KEY_CACHE_TTL)
            .map(|entry| entry.key.clone())
    }

    async fn cache_key(&self, key: ResolvedKey) {
        self.key_cache.write().await.insert(
            key.key_id.clone(),
            CacheEntry {
                key,
                cached_at: Instant::now(),
            },
        );
    }

    async fn key_from_db(&self, key_id: &str) -> AppResult<Option<ResolvedKey>> {
        let Some(keypair) = self.keypair_repo.find_by_key_id(key_id).await? else {
            return Ok(None);
        };
        let owner = self.user_repo.get_by_id(&keypair.user_id).await?;
        Ok(Some(resolved_from_rows(&owner, &keypair)))
    }

    /// Store a freshly fetched remote actor and its published key.
    async fn persist_remote_actor(
        &self,
        document: &Value,
        actor_url: &Url,
    ) -> AppResult<user::Model> {
        let host = actor_url
            .host_str()
            .ok_or_else(|| AppError::BadRequest("actor URL has no host".to_string()))?
            .to_lowercase();
        if self.is_local_host(&host) {
            return Err(AppError::BadRequest(
                "refusing to persist a local URI as a remote actor".to_string(),
            ));
        }

        let username = document
            .get("preferredUsername")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AppError::BadRequest("actor document missing preferredUsername".to_string())
            })?;
        let inbox = document.get("inbox").and_then(Value::as_str);
        let shared_inbox = document
            .get("endpoints")
            .and_then(|e| e.get("sharedInbox"))
            .and_then(Value::as_str)
            .or_else(|| document.get("sharedInbox").and_then(Value::as_str));
        let name = document.get("name").and_then(Value::as_str);

        let now = Utc::now().fixed_offset();
        let user_id = self.id_gen.generate();
        let created = self
            .user_repo
            .create(user::ActiveModel {
                id: Set(user_id.clone()),
                username: Set(username.to_string()),
                username_lower: Set(username.to_lowercase()),
                host: Set(Some(host)),
                name: Set(name.map(String::from)),
                is_suspended: Set(false),
                inbox: Set(inbox.map(String::from)),
                shared_inbox: Set(shared_inbox.map(String::from)),
                uri: Set(Some(actor_url.as_str().to_string())),
                last_fetched_at: Set(Some(now)),
                created_at: Set(now),
                updated_at: Set(None),
            })
            .await?;

        if let Some((key_id, public_key_pem)) = extract_public_key(document) {
            self.keypair_repo
                .create(user_keypair::ActiveModel {
                    user_id: Set(user_id),
                    public_key: Set(public_key_pem),
                    private_key: Set(None),
                    key_id: Set(key_id),
                    created_at: Set(now),
                    updated_at: Set(None),
                })
                .await?;
        }

        info!(actor = %actor_url, id = %created.id, "persisted remote actor");
        Ok(created)
    }
}

/// Strip the key fragment to obtain the actor document URL.
pub(crate) fn actor_url_from_key_id(key_id: &str) -> AppResult<Url> {
    let base = key_id.split('#').next().unwrap_or(key_id);
    Url::parse(base).map_err(|e| AppError::BadRequest(format!("invalid keyId: {e}")))
}

/// Extract `(key id, PEM)` from an actor document's `publicKey`.
fn extract_public_key(document: &Value) -> Option<(String, String)> {
    let public_key = document.get("publicKey")?;
    // Some implementations publish a list of keys; take the first.
    let public_key = match public_key {
        Value::Array(keys) => keys.first()?,
        other => other,
    };
    let key_id = public_key.get("id").and_then(Value::as_str)?;
    let pem = public_key.get("publicKeyPem").and_then(Value::as_str)?;
    Some((key_id.to_string(), pem.to_string()))
}

fn resolved_from_rows(owner: &user::Model, keypair: &user_keypair::Model) -> ResolvedKey {
    ResolvedKey {
        key_id: keypair.key_id.clone(),
        owner_id: owner.id.clone(),
        owner_uri: owner
            .uri
            .clone()
            .unwrap_or_else(|| keypair.key_id.split('#').next().unwrap_or_default().to_string()),
        owner_host: owner.host.clone(),
        public_key_pem: keypair.public_key.clone(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_actor_url_from_key_id() {
        let url = actor_url_from_key_id("https://a.example/users/1#main-key").unwrap();
        assert_eq!(url.as_str(), "https://a.example/users/1");

        let bare = actor_url_from_key_id("https://a.example/users/1").unwrap();
        assert_eq!(bare.as_str(), "https://a.example/users/1");

        assert!(actor_url_from_key_id("not a url").is_err());
    }

    #[test]
    fn test_extract_public_key_object_and_list() {
        let doc = json!({
            "publicKey": {
                "id": "https://a.example/users/1#main-key",
                "publicKeyPem": "-----BEGIN PUBLIC KEY-----"
            }
        });
        let (key_id, pem) = extract_public_key(&doc).unwrap();
        assert_eq!(key_id, "https://a.example/users/1#main-key");
        assert!(pem.starts_with("-----BEGIN"));

        let listed = json!({
            "publicKey": [{
                "id": "https://a.example/users/1#key-2",
                "publicKeyPem": "pem"
            }]
        });
        assert!(extract_public_key(&listed).is_some());

        assert!(extract_public_key(&json!({})).is_none());
    }
}
