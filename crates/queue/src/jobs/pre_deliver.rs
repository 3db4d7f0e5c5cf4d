//! Pre-delivery (fan-out) job.

use serde::{Deserialize, Serialize};

/// Queue name for pre-deliver jobs.
pub const PRE_DELIVER_QUEUE: &str = "preDeliver";

/// Job to expand one outbound activity into per-inbox delivery jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreDeliverJobData {
    /// The activity document, serialized exactly once at enqueue time.
    pub serialized_activity: String,

    /// Local actor the delivery happens on behalf of.
    pub actor_id: String,

    /// Explicitly targeted local user ids for remote recipients.
    #[serde(default)]
    pub recipient_ids: Vec<String>,

    /// Whether to also fan out to the actor's remote followers.
    #[serde(default)]
    pub deliver_to_followers: bool,
}
