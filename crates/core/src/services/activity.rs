//! Inbound activity handling seam.
//!
//! The inbox worker decodes and applies remote activities through this
//! trait; the concrete application logic lives above this crate.

use async_trait::async_trait;
use serde_json::Value;
use sparrow_common::AppResult;

/// Trait for applying a validated inbound activity.
///
/// Implementations receive the raw activity document together with the
/// addressing context the inbox endpoint recorded at accept time.
#[async_trait]
pub trait ActivityHandler: Send + Sync {
    /// Apply one inbound activity.
    ///
    /// # Arguments
    /// * `activity` - The activity document as received
    /// * `inbox_user_id` - The owner of the personal inbox it arrived at, if any
    /// * `authenticated_user_id` - The remote actor the signature bound, if any
    async fn perform(
        &self,
        activity: &Value,
        inbox_user_id: Option<&str>,
        authenticated_user_id: Option<&str>,
    ) -> AppResult<()>;
}

/// Trait for admitting a validated inbound activity to the inbox queue.
///
/// The HTTP handler answers 202 as soon as this returns; the queue
/// implementation lives above this crate.
#[async_trait]
pub trait InboxSink: Send + Sync {
    /// Enqueue one validated inbound request.
    async fn enqueue(
        &self,
        body: String,
        inbox_user_id: Option<String>,
        authenticated_user_id: Option<String>,
    ) -> AppResult<()>;
}

/// A handler that only logs, for tests and federation-disabled setups.
#[derive(Clone, Default)]
pub struct NoOpActivityHandler;

#[async_trait]
impl ActivityHandler for NoOpActivityHandler {
    async fn perform(
        &self,
        activity: &Value,
        inbox_user_id: Option<&str>,
        _authenticated_user_id: Option<&str>,
    ) -> AppResult<()> {
        let kind = activity
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        tracing::debug!(kind = %kind, inbox_user_id = ?inbox_user_id, "discarding activity");
        Ok(())
    }
}
