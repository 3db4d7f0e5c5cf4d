//! Inbound request authentication.
//!
//! This is the security boundary in front of the inbox queue: every
//! POST is authenticated here, by HTTP Signature or by embedded LD
//! signature, before anything is enqueued. Failures map to the HTTP
//! status the sender receives; nothing in here is retried.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use sparrow_common::http_signature::{HttpSignature, verify_digest};
use sparrow_common::{AppError, AppResult};
use sparrow_core::InstanceService;

use crate::activity::Activity;
use crate::jsonld;
use crate::ld_signature;
use crate::resolver::{ActorResolver, ResolvedKey, actor_url_from_key_id};
use crate::signature::HttpVerifier;

/// Outcome of validating one inbound POST.
#[derive(Debug)]
pub enum ValidationOutcome {
    /// Authenticated; enqueue for processing.
    Accepted(ValidatedRequest),
    /// A `Delete` whose actor no longer resolves: answer 202 and do
    /// nothing, rather than refetching a tombstone on every delivery.
    AcceptedNoOp,
}

/// An authenticated inbound activity.
#[derive(Debug)]
pub struct ValidatedRequest {
    /// The decoded activity.
    pub activity: Activity,
    /// Local row id of the remote actor the signature bound.
    pub authenticated_actor_id: String,
}

/// Validates inbound federation requests.
#[derive(Clone)]
pub struct InboxValidator {
    resolver: ActorResolver,
    instances: InstanceService,
    accept_ld_signatures: bool,
}

impl InboxValidator {
    /// Create a new validator.
    #[must_use]
    pub const fn new(
        resolver: ActorResolver,
        instances: InstanceService,
        accept_ld_signatures: bool,
    ) -> Self {
        Self {
            resolver,
            instances,
            accept_ld_signatures,
        }
    }

    /// Run the validation state machine over one request.
    ///
    /// `headers` must be lowercased header names to values; `path` is
    /// the request target path (with query).
    pub async fn validate(
        &self,
        method: &str,
        path: &str,
        headers: &HashMap<String, String>,
        body: &[u8],
    ) -> AppResult<ValidationOutcome> {
        if body.is_empty() {
            return Err(AppError::Structural("request has no body".to_string()));
        }

        // An unparseable signature header is not immediately fatal; the
        // LD fallback may still authenticate the payload. A blocked
        // sender is rejected before any parsing or network work.
        let signature = headers
            .get("signature")
            .and_then(|raw| HttpSignature::parse(raw).ok());
        if let Some(sig) = &signature
            && let Some(host) = key_id_host(&sig.key_id)
            && self.instances.is_blocked(&host).await?
        {
            debug!(host = %host, "rejecting inbound request from blocked host");
            return Err(AppError::BlockedInstance(host));
        }

        let document: Value = serde_json::from_slice(body)
            .map_err(|e| AppError::Structural(format!("body is not JSON: {e}")))?;
        let compacted = jsonld::compact(&document);
        let activity = Activity::from_json(&compacted)?;

        let actor_host = activity
            .actor_host()
            .ok_or_else(|| AppError::Structural("actor IRI has no host".to_string()))?
            .to_string();
        if self.instances.is_blocked(&actor_host).await? {
            debug!(host = %actor_host, "rejecting activity from blocked host");
            return Err(AppError::BlockedInstance(actor_host));
        }
        if self.resolver.is_local_host(&actor_host) {
            return Err(AppError::Forbidden(
                "activity claims a local actor".to_string(),
            ));
        }

        // HTTP Signature first; LD signature as the gated fallback.
        match &signature {
            Some(sig) => {
                if let Some(outcome) = self
                    .verify_http_signature(sig, &activity, method, path, headers, body)
                    .await?
                {
                    return Ok(outcome);
                }
            }
            None => debug!("no parseable signature header"),
        }

        // LD fallback: only for Delete, or when configured to accept
        // LD signatures generally.
        if activity.is_delete() || self.accept_ld_signatures {
            if let Some(outcome) = self.verify_ld_signature(&document, &activity).await? {
                return Ok(outcome);
            }
        }

        if signature.is_none() {
            return Err(AppError::Unauthorized(
                "request is not signed".to_string(),
            ));
        }
        Err(AppError::Forbidden(
            "signature verification failed".to_string(),
        ))
    }

    /// HTTP-Signature arm. `Ok(None)` means "fall through to LD".
    async fn verify_http_signature(
        &self,
        signature: &HttpSignature,
        activity: &Activity,
        method: &str,
        path: &str,
        headers: &HashMap<String, String>,
        body: &[u8],
    ) -> AppResult<Option<ValidationOutcome>> {
        // The digest the signature covers must describe this body.
        if let Some(digest) = headers.get("digest")
            && !verify_digest(body, digest)
        {
            return Err(AppError::Unauthorized("digest mismatch".to_string()));
        }

        let Some(key) = self.resolver.resolve_key(&signature.key_id).await? else {
            // Resolving the key already fetched the keyId's actor URL;
            // when that URL is the Delete's own actor, a second fetch of
            // the same tombstone would tell us nothing new.
            if activity.is_delete()
                && (key_names_actor(&signature.key_id, &activity.actor)
                    || self.resolver.try_resolve_actor(&activity.actor).await?.is_none())
            {
                debug!(actor = %activity.actor, "Delete from unresolvable actor, accepting as no-op");
                return Ok(Some(ValidationOutcome::AcceptedNoOp));
            }
            return Err(AppError::Unauthorized(format!(
                "cannot resolve signing key {}",
                signature.key_id
            )));
        };

        self.reject_bad_key_owner(&key).await?;

        let mut verified =
            HttpVerifier::verify(signature, &key.public_key_pem, method, path, headers)?;
        let mut key = key;
        if !verified {
            // One forced refetch covers remote key rotation.
            if let Some(fresh) = self.resolver.refresh_key(&signature.key_id).await? {
                self.reject_bad_key_owner(&fresh).await?;
                verified =
                    HttpVerifier::verify(signature, &fresh.public_key_pem, method, path, headers)?;
                key = fresh;
            }
        }

        let identity_matches = key.owner_uri == activity.actor.as_str();
        if verified && identity_matches {
            return Ok(Some(ValidationOutcome::Accepted(ValidatedRequest {
                activity: activity.clone(),
                authenticated_actor_id: key.owner_id,
            })));
        }

        if verified && !identity_matches {
            warn!(
                key_owner = %key.owner_uri,
                actor = %activity.actor,
                "signature verified but identity mismatch"
            );
        }
        Ok(None)
    }

    /// LD-Signature arm. `Ok(None)` means unverified.
    async fn verify_ld_signature(
        &self,
        raw_document: &Value,
        activity: &Activity,
    ) -> AppResult<Option<ValidationOutcome>> {
        if ld_signature::creator_key_id(raw_document).is_none() {
            return Ok(None);
        }

        // The verification key comes from the activity's actor, not
        // from the embedded creator, so a relayed document can only
        // authenticate its own author.
        let Some(key) = self.resolver.key_for_actor(&activity.actor).await? else {
            if activity.is_delete() {
                debug!(actor = %activity.actor, "Delete from unresolvable actor, accepting as no-op");
                return Ok(Some(ValidationOutcome::AcceptedNoOp));
            }
            return Ok(None);
        };
        self.reject_bad_key_owner(&key).await?;

        let mut verified = ld_signature::verify_signature(raw_document, &key.public_key_pem)?;
        let mut key = key;
        if !verified {
            if let Some(fresh) = self.resolver.refresh_key(&key.key_id).await? {
                self.reject_bad_key_owner(&fresh).await?;
                verified = ld_signature::verify_signature(raw_document, &fresh.public_key_pem)?;
                key = fresh;
            }
        }

        if verified {
            return Ok(Some(ValidationOutcome::Accepted(ValidatedRequest {
                activity: activity.clone(),
                authenticated_actor_id: key.owner_id,
            })));
        }
        Ok(None)
    }

    /// Local-actor impersonation and block-list enforcement on the key
    /// owner, independent of what the activity claims.
    async fn reject_bad_key_owner(&self, key: &ResolvedKey) -> AppResult<()> {
        match &key.owner_host {
            None => Err(AppError::Forbidden(
                "signing key belongs to a local actor".to_string(),
            )),
            Some(host) => {
                if self.instances.is_blocked(host).await? {
                    return Err(AppError::BlockedInstance(host.clone()));
                }
                Ok(())
            }
        }
    }
}

/// True when the keyId, stripped of its fragment, is the actor's own
/// document URL. Failing to resolve such a key already was the one
/// resolution attempt for that actor.
fn key_names_actor(key_id: &str, actor: &Url) -> bool {
    actor_url_from_key_id(key_id).is_ok_and(|url| url == *actor)
}

/// Host of a signature keyId, when it is a parseable URL.
fn key_id_host(key_id: &str) -> Option<String> {
    let base = key_id.split('#').next().unwrap_or(key_id);
    Url::parse(base)
        .ok()
        .and_then(|url| url.host_str().map(str::to_lowercase))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_key_id_host() {
        assert_eq!(
            key_id_host("https://a.example/users/1#main-key"),
            Some("a.example".to_string())
        );
        assert_eq!(key_id_host("garbage"), None);
    }

    #[test]
    fn test_key_names_actor_matches_fragment_stripped_key_id() {
        let actor = Url::parse("https://a.example/users/1").unwrap();
        assert!(key_names_actor("https://a.example/users/1#main-key", &actor));
        assert!(key_names_actor("https://a.example/users/1", &actor));
        assert!(!key_names_actor("https://a.example/keys/1#main-key", &actor));
        assert!(!key_names_actor("garbage", &actor));
    }
}
