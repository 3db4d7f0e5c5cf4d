//! Outbound activity construction.
//!
//! Builds the activity documents local actors publish; the results are
//! handed to the delivery pipeline as already-serialized payloads.

use serde_json::{Value, json};
use sparrow_common::IdGenerator;
use sparrow_db::entities::user;
use url::Url;

const AS_CONTEXT: &str = "https://www.w3.org/ns/activitystreams";
const PUBLIC: &str = "https://www.w3.org/ns/activitystreams#Public";

/// Builds outbound activities for local actors.
#[derive(Clone)]
pub struct ActivityBuilder {
    base_url: Url,
    id_gen: IdGenerator,
}

impl ActivityBuilder {
    /// Create a builder for this instance's base URL.
    #[must_use]
    pub const fn new(base_url: Url) -> Self {
        Self {
            base_url,
            id_gen: IdGenerator::new(),
        }
    }

    /// Canonical URL of a local actor.
    #[must_use]
    pub fn actor_url(&self, user_id: &str) -> String {
        format!("{}users/{user_id}", self.base_url)
    }

    /// Key id of a local actor's signing key.
    #[must_use]
    pub fn key_id(&self, user_id: &str) -> String {
        format!("{}#main-key", self.actor_url(user_id))
    }

    /// A `Create` wrapping a public note object.
    #[must_use]
    pub fn create_note(&self, author: &user::Model, note_id: &str, content: &str) -> Value {
        let actor_url = self.actor_url(&author.id);
        let note_url = format!("{}notes/{note_id}", self.base_url);
        let followers = format!("{actor_url}/followers");

        json!({
            "@context": AS_CONTEXT,
            "id": format!("{note_url}/activity"),
            "type": "Create",
            "actor": actor_url,
            "to": [PUBLIC],
            "cc": [followers],
            "object": {
                "id": note_url,
                "type": "Note",
                "attributedTo": actor_url,
                "content": content,
                "published": chrono::Utc::now().to_rfc3339(),
                "to": [PUBLIC],
                "cc": [followers],
            }
        })
    }

    /// A `Delete` tombstoning a local note.
    #[must_use]
    pub fn delete_note(&self, author: &user::Model, note_id: &str) -> Value {
        let actor_url = self.actor_url(&author.id);
        json!({
            "@context": AS_CONTEXT,
            "id": format!("{actor_url}/delete/{}", self.id_gen.generate()),
            "type": "Delete",
            "actor": actor_url,
            "to": [PUBLIC],
            "object": {
                "id": format!("{}notes/{note_id}", self.base_url),
                "type": "Tombstone"
            }
        })
    }

    /// A `Follow` from a local actor to a remote one.
    #[must_use]
    pub fn follow(&self, follower: &user::Model, followee: &user::Model) -> Value {
        let actor_url = self.actor_url(&follower.id);
        json!({
            "@context": AS_CONTEXT,
            "id": format!("{actor_url}/follow/{}", self.id_gen.generate()),
            "type": "Follow",
            "actor": actor_url,
            "object": self.uri_of(followee),
        })
    }

    /// An `Accept` of a remote `Follow`.
    #[must_use]
    pub fn accept_follow(&self, followee: &user::Model, follow_activity: &Value) -> Value {
        let actor_url = self.actor_url(&followee.id);
        json!({
            "@context": AS_CONTEXT,
            "id": format!("{actor_url}/accept/{}", self.id_gen.generate()),
            "type": "Accept",
            "actor": actor_url,
            "object": follow_activity,
        })
    }

    /// An `Undo` of a previously delivered activity.
    #[must_use]
    pub fn undo(&self, actor: &user::Model, activity: &Value) -> Value {
        let actor_url = self.actor_url(&actor.id);
        json!({
            "@context": AS_CONTEXT,
            "id": format!("{actor_url}/undo/{}", self.id_gen.generate()),
            "type": "Undo",
            "actor": actor_url,
            "object": activity,
        })
    }

    /// A `Like` of a remote object.
    #[must_use]
    pub fn like(&self, actor: &user::Model, object_uri: &str) -> Value {
        let actor_url = self.actor_url(&actor.id);
        json!({
            "@context": AS_CONTEXT,
            "id": format!("{actor_url}/like/{}", self.id_gen.generate()),
            "type": "Like",
            "actor": actor_url,
            "object": object_uri,
        })
    }

    /// An `Announce` (boost) of an object.
    #[must_use]
    pub fn announce(&self, actor: &user::Model, object_uri: &str) -> Value {
        let actor_url = self.actor_url(&actor.id);
        json!({
            "@context": AS_CONTEXT,
            "id": format!("{actor_url}/announce/{}", self.id_gen.generate()),
            "type": "Announce",
            "actor": actor_url,
            "to": [PUBLIC],
            "cc": [format!("{actor_url}/followers")],
            "object": object_uri,
        })
    }

    fn uri_of(&self, user: &user::Model) -> String {
        user.uri
            .clone()
            .unwrap_or_else(|| self.actor_url(&user.id))
    }
}
