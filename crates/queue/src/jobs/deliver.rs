//! Per-inbox delivery job.

use serde::{Deserialize, Serialize};

/// Queue name for deliver jobs.
pub const DELIVER_QUEUE: &str = "deliver";

/// Job to POST one finished payload to one remote inbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverJobData {
    /// Destination inbox URL.
    pub inbox_url: String,

    /// The final payload: signed/compacted once at fan-out time.
    pub payload: String,

    /// Content type to send the payload as.
    pub content_type: String,

    /// Local actor whose key signs the request.
    pub user_id: String,

    /// Destination host, for block-list and reachability bookkeeping.
    pub recipient_host: String,
}
