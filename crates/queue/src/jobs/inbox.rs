//! Inbox processing job.

use serde::{Deserialize, Serialize};

/// Queue name for inbox jobs.
pub const INBOX_QUEUE: &str = "inbox";

/// Job to process one validated inbound activity.
///
/// Field names are part of the persisted payload format and must stay
/// stable across releases; jobs written before a deploy are read after.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxJobData {
    /// The raw request body as received.
    pub body: String,

    /// Owner of the personal inbox the request targeted, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inbox_user_id: Option<String>,

    /// Local row id of the remote actor validation authenticated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticated_user_id: Option<String>,
}

impl InboxJobData {
    /// Create a new inbox job payload.
    #[must_use]
    pub const fn new(
        body: String,
        inbox_user_id: Option<String>,
        authenticated_user_id: Option<String>,
    ) -> Self {
        Self {
            body,
            inbox_user_id,
            authenticated_user_id,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_field_names() {
        let data = InboxJobData::new(
            r#"{"type":"Create"}"#.to_string(),
            Some("u1".to_string()),
            Some("u2".to_string()),
        );
        let json = serde_json::to_value(&data).unwrap();

        assert!(json.get("body").is_some());
        assert_eq!(json["inboxUserId"], "u1");
        assert_eq!(json["authenticatedUserId"], "u2");
    }

    #[test]
    fn test_optional_fields_omitted() {
        let data = InboxJobData::new("{}".to_string(), None, None);
        let json = serde_json::to_value(&data).unwrap();
        assert!(json.get("inboxUserId").is_none());
        assert!(json.get("authenticatedUserId").is_none());

        let back: InboxJobData = serde_json::from_value(json).unwrap();
        assert!(back.inbox_user_id.is_none());
    }
}
