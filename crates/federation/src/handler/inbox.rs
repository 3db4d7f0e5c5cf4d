//! Inbox endpoints.
//!
//! `POST /inbox` (shared) and `POST /users/{id}/inbox` (personal) run
//! inbound validation and enqueue the accepted activity; the HTTP
//! response is issued as soon as the job row exists.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, Uri},
    response::IntoResponse,
};
use tracing::{debug, info};

use sparrow_common::AppError;
use sparrow_core::InboxSink;
use sparrow_db::repositories::UserRepository;

use crate::inbox_validation::{InboxValidator, ValidationOutcome};

/// State shared by the inbox handlers.
#[derive(Clone)]
pub struct InboxState {
    /// Request validator.
    pub validator: InboxValidator,
    /// Queue seam the accepted activity is handed to.
    pub sink: Arc<dyn InboxSink>,
    /// For checking that a personal inbox's owner exists.
    pub user_repo: UserRepository,
}

impl InboxState {
    /// Create inbox handler state.
    #[must_use]
    pub fn new(
        validator: InboxValidator,
        sink: Arc<dyn InboxSink>,
        user_repo: UserRepository,
    ) -> Self {
        Self {
            validator,
            sink,
            user_repo,
        }
    }
}

/// `POST /inbox` — the shared inbox.
pub async fn shared_inbox_handler(
    State(state): State<InboxState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    handle_inbox(&state, None, &uri, &headers, &body).await
}

/// `POST /users/{id}/inbox` — a local user's personal inbox.
pub async fn user_inbox_handler(
    State(state): State<InboxState>,
    Path(user_id): Path<String>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    handle_inbox(&state, Some(user_id), &uri, &headers, &body).await
}

async fn handle_inbox(
    state: &InboxState,
    inbox_user_id: Option<String>,
    uri: &Uri,
    headers: &HeaderMap,
    body: &Bytes,
) -> axum::response::Response {
    if let Some(user_id) = &inbox_user_id {
        match state.user_repo.find_by_id(user_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                return AppError::NotFound(format!("no such user: {user_id}")).into_response();
            }
            Err(e) => return e.into_response(),
        }
    }

    let path = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), ToString::to_string);
    let header_values = lowercase_headers(headers);

    let outcome = match state
        .validator
        .validate("POST", &path, &header_values, body)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            debug!(error = %e, "inbound request rejected");
            return e.into_response();
        }
    };

    match outcome {
        ValidationOutcome::AcceptedNoOp => StatusCode::ACCEPTED.into_response(),
        ValidationOutcome::Accepted(validated) => {
            info!(
                kind = validated.activity.kind.as_str(),
                actor = %validated.activity.actor,
                "activity accepted"
            );
            let raw_body = String::from_utf8_lossy(body).into_owned();
            match state
                .sink
                .enqueue(
                    raw_body,
                    inbox_user_id,
                    Some(validated.authenticated_actor_id),
                )
                .await
            {
                Ok(()) => StatusCode::ACCEPTED.into_response(),
                Err(e) => e.into_response(),
            }
        }
    }
}

/// Header map with lowercased names, as signature verification expects.
fn lowercase_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_lowercase_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("Digest", HeaderValue::from_static("SHA-256=abc"));
        headers.insert("Date", HeaderValue::from_static("Sun, 06 Nov 1994 08:49:37 GMT"));

        let map = lowercase_headers(&headers);
        assert_eq!(map.get("digest").unwrap(), "SHA-256=abc");
        assert!(map.contains_key("date"));
    }
}
