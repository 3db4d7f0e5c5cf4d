//! Sparrow server entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, routing::post};
use sparrow_common::{Config, IdGenerator};
use sparrow_core::{InstanceService, NoOpActivityHandler};
use sparrow_db::repositories::{
    FollowingRepository, InstanceRepository, JobRepository, UserKeypairRepository, UserRepository,
    WorkerRepository,
};
use sparrow_federation::{
    ActorResolver, ApClient, ConcurrencyGuardLayer, InboxState, InboxValidator,
    shared_inbox_handler, user_inbox_handler,
};
use sparrow_queue::jobs::{DELIVER_QUEUE, INBOX_QUEUE, PRE_DELIVER_QUEUE};
use sparrow_queue::{
    DeliverWorker, InboxWorker, JobEnqueuer, JobQueue, PreDeliverWorker, QueueInboxSink,
    QueueMaintenance, SigningKeyCache,
};
use tokio::signal;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

/// How often this process refreshes its worker heartbeat.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sparrow=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting sparrow server...");

    // Load configuration
    let config = Config::load()?;

    // Connect to database and run migrations
    let db = sparrow_db::init(&config).await?;
    info!("Connected to database");

    info!("Running database migrations...");
    sparrow_db::migrate(&db).await?;
    info!("Migrations completed");

    // Initialize repositories
    let db = Arc::new(db);
    let user_repo = UserRepository::new(Arc::clone(&db));
    let user_keypair_repo = UserKeypairRepository::new(Arc::clone(&db));
    let following_repo = FollowingRepository::new(Arc::clone(&db));
    let instance_repo = InstanceRepository::new(Arc::clone(&db));
    let job_repo = JobRepository::new(Arc::clone(&db));
    let worker_repo = WorkerRepository::new(Arc::clone(&db));

    // Register this process in the worker table so stalled-job reclaim
    // can tell live workers from dead ones.
    let worker_id = IdGenerator::new().generate_uuid_v4();
    worker_repo
        .register(&worker_id, Some(&config.federation.instance_name))
        .await?;
    info!(worker_id = %worker_id, "Registered queue worker");

    let base_url = Url::parse(&config.server.url)?;
    let local_host = base_url.host_str().unwrap_or("localhost").to_string();

    // Federation plumbing
    let ap_client = ApClient::new(&config.server.url)?;
    let resolver = ActorResolver::new(
        user_repo.clone(),
        user_keypair_repo.clone(),
        ap_client.clone(),
        local_host,
    );
    let instances = InstanceService::new(instance_repo, &config.federation);
    let validator = InboxValidator::new(
        resolver,
        instances.clone(),
        config.federation.accept_ld_signatures,
    );

    // Queue plumbing
    let enqueuer = JobEnqueuer::new(job_repo.clone());
    let inbox_sink = Arc::new(QueueInboxSink::new(enqueuer.clone()));
    let key_cache = SigningKeyCache::new(user_keypair_repo.clone());
    let poll_interval = Duration::from_secs(config.queue.poll_interval_secs);

    // Spawn queue workers and maintenance, all tied to one shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut worker_handles = Vec::new();
    if config.federation.enabled {
        let inbox_worker = InboxWorker::new(
            Arc::new(NoOpActivityHandler),
            user_repo.clone(),
            instances.clone(),
        );
        let pre_deliver_worker = PreDeliverWorker::new(
            user_repo.clone(),
            following_repo,
            instances.clone(),
            key_cache.clone(),
            enqueuer,
            config.federation.attach_ld_signatures,
        );
        let deliver_worker = DeliverWorker::new(key_cache, ap_client, instances);

        worker_handles.extend(
            JobQueue::new(
                INBOX_QUEUE,
                inbox_worker,
                job_repo.clone(),
                worker_id.clone(),
                config.queue.inbox_parallelism,
                poll_interval,
            )
            .spawn(shutdown_rx.clone()),
        );
        worker_handles.extend(
            JobQueue::new(
                PRE_DELIVER_QUEUE,
                pre_deliver_worker,
                job_repo.clone(),
                worker_id.clone(),
                config.queue.pre_deliver_parallelism,
                poll_interval,
            )
            .spawn(shutdown_rx.clone()),
        );
        worker_handles.extend(
            JobQueue::new(
                DELIVER_QUEUE,
                deliver_worker,
                job_repo.clone(),
                worker_id.clone(),
                config.queue.deliver_parallelism,
                poll_interval,
            )
            .spawn(shutdown_rx.clone()),
        );
        worker_handles.extend(
            QueueMaintenance::new(job_repo, &config.queue).spawn(shutdown_rx.clone()),
        );
        info!("Queue workers started");
    }

    // Heartbeat loop
    {
        let worker_repo = worker_repo.clone();
        let worker_id = worker_id.clone();
        let mut shutdown = shutdown_rx;
        worker_handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = worker_repo.heartbeat(&worker_id).await {
                            tracing::warn!(error = %e, "worker heartbeat failed");
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        }));
    }

    // Build router: the two federation inboxes, guarded against
    // inbound floods.
    let inbox_state = InboxState::new(validator, inbox_sink, user_repo);
    let concurrency_guard = ConcurrencyGuardLayer::new(config.federation.max_inbound_concurrency);
    let app = Router::new()
        .route("/inbox", post(shared_inbox_handler))
        .route("/users/{id}/inbox", post(user_inbox_handler))
        .with_state(inbox_state)
        .layer(concurrency_guard.clone())
        .layer(TraceLayer::new_for_http());

    // Start server with graceful shutdown
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Requests parked at the guard get a fast 503 instead of
            // holding the graceful drain open.
            concurrency_guard.close();
        })
        .await?;

    // Stop the queues, let in-flight jobs finish, then deregister.
    let _ = shutdown_tx.send(true);
    for handle in worker_handles {
        let _ = handle.await;
    }
    worker_repo.deregister(&worker_id).await?;

    info!("Server shutdown complete");
    Ok(())
}
