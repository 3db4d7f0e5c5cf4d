//! Concurrency guard for inbound federation routes.
//!
//! Signature verification is CPU- and DB-expensive; a burst of inbound
//! deliveries must not exhaust local capacity. A counting semaphore caps
//! in-flight federation requests; waiting is cancellable, and a wait
//! that cannot complete answers 503 instead of queueing forever.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use tokio::sync::Semaphore;
use tower::Layer;
use tracing::warn;

/// Layer applying the federation concurrency cap.
#[derive(Clone)]
pub struct ConcurrencyGuardLayer {
    semaphore: Option<Arc<Semaphore>>,
}

impl ConcurrencyGuardLayer {
    /// Create a guard admitting at most `limit` concurrent requests.
    /// A limit of zero or below disables the guard entirely.
    #[must_use]
    pub fn new(limit: i64) -> Self {
        let semaphore = usize::try_from(limit)
            .ok()
            .filter(|&n| n > 0)
            .map(|n| Arc::new(Semaphore::new(n)));
        Self { semaphore }
    }

    /// Close the underlying semaphore. Requests still waiting for a
    /// permit, and any that arrive afterwards, are answered with 503.
    pub fn close(&self) {
        if let Some(semaphore) = &self.semaphore {
            semaphore.close();
        }
    }
}

impl<S> Layer<S> for ConcurrencyGuardLayer {
    type Service = ConcurrencyGuardService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ConcurrencyGuardService {
            inner,
            semaphore: self.semaphore.clone(),
        }
    }
}

/// Service holding requests at the semaphore.
#[derive(Clone)]
pub struct ConcurrencyGuardService<S> {
    inner: S,
    semaphore: Option<Arc<Semaphore>>,
}

impl<S> tower::Service<Request<Body>> for ConcurrencyGuardService<S>
where
    S: tower::Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        tower::Service::poll_ready(&mut self.inner, cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let semaphore = self.semaphore.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let Some(semaphore) = semaphore else {
                return tower::Service::call(&mut inner, req).await;
            };

            // The permit is dropped when the response future completes,
            // releasing the slot on success and failure alike. Waiting
            // ends early if the client disconnects (the whole future is
            // dropped) or the semaphore is closed at shutdown.
            match semaphore.acquire_owned().await {
                Ok(_permit) => tower::Service::call(&mut inner, req).await,
                Err(_) => {
                    warn!("federation concurrency guard closed, refusing request");
                    Ok((StatusCode::SERVICE_UNAVAILABLE, "server shutting down").into_response())
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_nonpositive_limit_disables_guard() {
        assert!(ConcurrencyGuardLayer::new(0).semaphore.is_none());
        assert!(ConcurrencyGuardLayer::new(-5).semaphore.is_none());
        assert!(ConcurrencyGuardLayer::new(8).semaphore.is_some());
    }

    #[tokio::test]
    async fn test_semaphore_caps_permits() {
        let layer = ConcurrencyGuardLayer::new(2);
        let semaphore = layer.semaphore.unwrap();

        let first = semaphore.clone().acquire_owned().await.unwrap();
        let _second = semaphore.clone().acquire_owned().await.unwrap();
        assert_eq!(semaphore.available_permits(), 0);

        drop(first);
        assert_eq!(semaphore.available_permits(), 1);
    }

    fn ok_service() -> impl tower::Service<
        Request<Body>,
        Response = Response,
        Error = std::convert::Infallible,
        Future: Send,
    > + Clone
    + Send {
        tower::service_fn(|_req: Request<Body>| async {
            Ok::<_, std::convert::Infallible>(StatusCode::OK.into_response())
        })
    }

    fn inbox_request() -> Request<Body> {
        Request::builder()
            .uri("/inbox")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_closed_guard_answers_unavailable() {
        let layer = ConcurrencyGuardLayer::new(1);
        layer.close();

        let mut service = layer.layer(ok_service());
        let response = tower::Service::call(&mut service, inbox_request())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_close_releases_parked_waiters() {
        let layer = ConcurrencyGuardLayer::new(1);
        let _held = layer.semaphore.clone().unwrap().acquire_owned().await.unwrap();

        let mut service = layer.layer(ok_service());
        let waiter =
            tokio::spawn(
                async move { tower::Service::call(&mut service, inbox_request()).await },
            );
        tokio::task::yield_now().await;

        layer.close();
        let response = waiter.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
