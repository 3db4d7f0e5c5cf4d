//! ActivityPub delivery service.
//!
//! Provides an abstraction for queueing outbound activity delivery.
//! The actual implementation is provided by the queue crate.

use async_trait::async_trait;
use serde_json::Value;
use sparrow_common::AppResult;
use std::sync::Arc;

/// Trait for queueing outbound activity delivery.
///
/// This allows core services to hand activities to the delivery pipeline
/// without directly depending on the queue implementation.
#[async_trait]
pub trait ActivityDelivery: Send + Sync {
    /// Queue an activity for fan-out and delivery.
    ///
    /// # Arguments
    /// * `actor_id` - The local user the activity is delivered on behalf of
    /// * `activity` - The activity document
    /// * `recipient_ids` - Explicitly targeted user ids
    /// * `deliver_to_followers` - Whether to also fan out to the actor's followers
    async fn queue_delivery(
        &self,
        actor_id: &str,
        activity: Value,
        recipient_ids: Vec<String>,
        deliver_to_followers: bool,
    ) -> AppResult<()>;
}

/// A no-op implementation for testing or when federation is disabled.
#[derive(Clone, Default)]
pub struct NoOpDelivery;

#[async_trait]
impl ActivityDelivery for NoOpDelivery {
    async fn queue_delivery(
        &self,
        _actor_id: &str,
        _activity: Value,
        _recipient_ids: Vec<String>,
        _deliver_to_followers: bool,
    ) -> AppResult<()> {
        Ok(())
    }
}

/// Delivery service wrapping the configured [`ActivityDelivery`] backend.
#[derive(Clone)]
pub struct DeliveryService {
    delivery: Arc<dyn ActivityDelivery>,
    federation_enabled: bool,
}

impl DeliveryService {
    /// Create a new delivery service.
    #[must_use]
    pub fn new(delivery: Arc<dyn ActivityDelivery>, federation_enabled: bool) -> Self {
        Self {
            delivery,
            federation_enabled,
        }
    }

    /// Queue an activity for the actor's remote followers.
    pub async fn deliver_to_followers(&self, actor_id: &str, activity: Value) -> AppResult<()> {
        self.deliver(actor_id, activity, Vec::new(), true).await
    }

    /// Queue an activity for a single recipient.
    pub async fn deliver_to_user(
        &self,
        actor_id: &str,
        activity: Value,
        recipient_id: &str,
    ) -> AppResult<()> {
        self.deliver(actor_id, activity, vec![recipient_id.to_owned()], false)
            .await
    }

    /// Queue an activity for explicit recipients and optionally followers.
    pub async fn deliver(
        &self,
        actor_id: &str,
        activity: Value,
        recipient_ids: Vec<String>,
        deliver_to_followers: bool,
    ) -> AppResult<()> {
        if !self.federation_enabled {
            tracing::debug!(actor_id = %actor_id, "federation disabled, dropping outbound activity");
            return Ok(());
        }
        if recipient_ids.is_empty() && !deliver_to_followers {
            return Ok(());
        }
        self.delivery
            .queue_delivery(actor_id, activity, recipient_ids, deliver_to_followers)
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingDelivery {
        calls: Mutex<Vec<(String, Vec<String>, bool)>>,
    }

    #[async_trait]
    impl ActivityDelivery for RecordingDelivery {
        async fn queue_delivery(
            &self,
            actor_id: &str,
            _activity: Value,
            recipient_ids: Vec<String>,
            deliver_to_followers: bool,
        ) -> AppResult<()> {
            self.calls.lock().unwrap().push((
                actor_id.to_owned(),
                recipient_ids,
                deliver_to_followers,
            ));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_disabled_federation_drops_activity() {
        let backend = Arc::new(RecordingDelivery {
            calls: Mutex::new(Vec::new()),
        });
        let service = DeliveryService::new(backend.clone(), false);
        service
            .deliver_to_followers("user1", serde_json::json!({"type": "Create"}))
            .await
            .unwrap();
        assert!(backend.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_targets_short_circuit() {
        let backend = Arc::new(RecordingDelivery {
            calls: Mutex::new(Vec::new()),
        });
        let service = DeliveryService::new(backend.clone(), true);
        service
            .deliver("user1", serde_json::json!({}), Vec::new(), false)
            .await
            .unwrap();
        assert!(backend.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deliver_to_user_passes_recipients() {
        let backend = Arc::new(RecordingDelivery {
            calls: Mutex::new(Vec::new()),
        });
        let service = DeliveryService::new(backend.clone(), true);
        service
            .deliver_to_user("user1", serde_json::json!({"type": "Accept"}), "user2")
            .await
            .unwrap();
        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "user1");
        assert_eq!(calls[0].1, vec!["user2".to_owned()]);
        assert!(!calls[0].2);
    }
}
