//! Inbox endpoint behavior through the full axum stack.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::post;
use sea_orm::{DatabaseBackend, MockDatabase};
use tower::ServiceExt;

use sparrow_common::AppResult;
use sparrow_common::config::FederationConfig;
use sparrow_core::{InboxSink, InstanceService};
use sparrow_db::entities::{instance, user};
use sparrow_db::repositories::{InstanceRepository, UserKeypairRepository, UserRepository};
use sparrow_federation::{
    ActorResolver, ApClient, InboxState, InboxValidator, shared_inbox_handler, user_inbox_handler,
};

#[derive(Default)]
struct RecordingSink {
    enqueued: Mutex<Vec<String>>,
}

#[async_trait]
impl InboxSink for RecordingSink {
    async fn enqueue(
        &self,
        body: String,
        _inbox_user_id: Option<String>,
        _authenticated_user_id: Option<String>,
    ) -> AppResult<()> {
        self.enqueued.lock().unwrap().push(body);
        Ok(())
    }
}

fn router_over(db: sea_orm::DatabaseConnection, sink: Arc<RecordingSink>) -> Router {
    let db = Arc::new(db);
    let user_repo = UserRepository::new(Arc::clone(&db));
    let keypair_repo = UserKeypairRepository::new(Arc::clone(&db));
    let instance_repo = InstanceRepository::new(Arc::clone(&db));

    let client = ApClient::new("https://local.example").unwrap();
    let resolver = ActorResolver::new(
        user_repo.clone(),
        keypair_repo,
        client,
        "local.example".to_string(),
    );
    let instances = InstanceService::new(instance_repo, &FederationConfig::default());
    let validator = InboxValidator::new(resolver, instances, false);

    let state = InboxState::new(validator, sink, user_repo);
    Router::new()
        .route("/inbox", post(shared_inbox_handler))
        .route("/users/{id}/inbox", post(user_inbox_handler))
        .with_state(state)
}

fn post_inbox(path: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/activity+json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_empty_body_is_unprocessable() {
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let sink = Arc::new(RecordingSink::default());
    let app = router_over(db, Arc::clone(&sink));

    let response = app.oneshot(post_inbox("/inbox", "")).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(sink.enqueued.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unsigned_activity_is_unauthorized() {
    // One instance lookup for the actor's host; no signature and no LD
    // fallback for a Create means the request is turned away.
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<instance::Model>::new()])
        .into_connection();
    let sink = Arc::new(RecordingSink::default());
    let app = router_over(db, Arc::clone(&sink));

    let body = serde_json::json!({
        "type": "Create",
        "id": "https://remote.example/activities/1",
        "actor": "https://remote.example/users/alice",
        "object": {"type": "Note", "content": "hi"}
    })
    .to_string();
    let response = app.oneshot(post_inbox("/inbox", &body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(sink.enqueued.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_personal_inbox_of_unknown_user_is_not_found() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<user::Model>::new()])
        .into_connection();
    let sink = Arc::new(RecordingSink::default());
    let app = router_over(db, sink);

    let response = app
        .oneshot(post_inbox("/users/nobody/inbox", "{}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_signed_activity_from_known_actor_is_accepted() {
    let actor_uri = "https://remote.example/users/alice";
    let key_id = format!("{actor_uri}#main-key");
    let keypair = sparrow_common::generate_rsa_keypair().unwrap();

    let now = chrono::Utc::now().fixed_offset();
    let owner = user::Model {
        id: "r1".to_string(),
        username: "alice".to_string(),
        username_lower: "alice".to_string(),
        host: Some("remote.example".to_string()),
        name: None,
        is_suspended: false,
        inbox: Some("https://remote.example/users/alice/inbox".to_string()),
        shared_inbox: None,
        uri: Some(actor_uri.to_string()),
        last_fetched_at: Some(now),
        created_at: now,
        updated_at: None,
    };
    let keypair_row = sparrow_db::entities::user_keypair::Model {
        user_id: "r1".to_string(),
        public_key: keypair.public_key_pem.clone(),
        private_key: None,
        key_id: key_id.clone(),
        created_at: now,
        updated_at: None,
    };

    // Blocked-host checks for the key host, the actor host, and the
    // key owner's host, then the key and owner rows themselves.
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([
            Vec::<instance::Model>::new(),
            Vec::<instance::Model>::new(),
        ])
        .append_query_results([vec![keypair_row]])
        .append_query_results([vec![owner]])
        .append_query_results([Vec::<instance::Model>::new()])
        .into_connection();
    let sink = Arc::new(RecordingSink::default());
    let app = router_over(db, Arc::clone(&sink));

    let body = serde_json::json!({
        "type": "Create",
        "id": "https://remote.example/activities/1",
        "actor": actor_uri,
        "object": {"type": "Note", "content": "hi"}
    })
    .to_string();

    let signer =
        sparrow_federation::HttpSigner::new(&keypair.private_key_pem, key_id.clone()).unwrap();
    let inbox_url = url::Url::parse("https://local.example/inbox").unwrap();
    let signed_headers = signer
        .sign_post(&inbox_url, body.as_bytes(), "application/activity+json")
        .unwrap();

    let mut request = Request::builder().method("POST").uri("/inbox");
    for (name, value) in &signed_headers {
        request = request.header(name, value);
    }
    let request = request.body(Body::from(body.clone())).unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let enqueued = sink.enqueued.lock().unwrap();
    assert_eq!(enqueued.as_slice(), [body]);
}

#[tokio::test]
async fn test_blocked_actor_host_is_forbidden() {
    // Block list is config-driven, so no database rows are needed.
    let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
    let user_repo = UserRepository::new(Arc::clone(&db));
    let keypair_repo = UserKeypairRepository::new(Arc::clone(&db));
    let instance_repo = InstanceRepository::new(Arc::clone(&db));

    let federation = FederationConfig {
        blocked_hosts: vec!["remote.example".to_string()],
        ..FederationConfig::default()
    };
    let resolver = ActorResolver::new(
        user_repo.clone(),
        keypair_repo,
        ApClient::new("https://local.example").unwrap(),
        "local.example".to_string(),
    );
    let validator = InboxValidator::new(
        resolver,
        InstanceService::new(instance_repo, &federation),
        false,
    );
    let state = InboxState::new(validator, Arc::new(RecordingSink::default()), user_repo);
    let app = Router::new()
        .route("/inbox", post(shared_inbox_handler))
        .with_state(state);

    let body = serde_json::json!({
        "type": "Create",
        "id": "https://remote.example/activities/1",
        "actor": "https://remote.example/users/alice",
        "object": {}
    })
    .to_string();
    let response = app.oneshot(post_inbox("/inbox", &body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
