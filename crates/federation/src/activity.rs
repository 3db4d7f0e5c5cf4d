//! Typed inbound activities.
//!
//! Incoming JSON-LD documents are decoded into a closed set of handled
//! activity kinds by explicit type-tag dispatch. Anything else is a
//! structural error; the inbox never retries those.

use serde_json::Value;
use sparrow_common::{AppError, AppResult};
use url::Url;

/// The activity kinds this server handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Create,
    Delete,
    Follow,
    Undo,
    Accept,
    Reject,
    Like,
    Announce,
    EmojiReact,
    Update,
    Move,
}

impl ActivityKind {
    /// Dispatch on the `type` tag; `None` for unhandled kinds.
    #[must_use]
    pub fn from_type_tag(tag: &str) -> Option<Self> {
        match tag {
            "Create" => Some(Self::Create),
            "Delete" => Some(Self::Delete),
            "Follow" => Some(Self::Follow),
            "Undo" => Some(Self::Undo),
            "Accept" => Some(Self::Accept),
            "Reject" => Some(Self::Reject),
            "Like" => Some(Self::Like),
            "Announce" => Some(Self::Announce),
            "EmojiReact" => Some(Self::EmojiReact),
            "Update" => Some(Self::Update),
            "Move" => Some(Self::Move),
            _ => None,
        }
    }

    /// The `type` tag for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Delete => "Delete",
            Self::Follow => "Follow",
            Self::Undo => "Undo",
            Self::Accept => "Accept",
            Self::Reject => "Reject",
            Self::Like => "Like",
            Self::Announce => "Announce",
            Self::EmojiReact => "EmojiReact",
            Self::Update => "Update",
            Self::Move => "Move",
        }
    }
}

/// A decoded inbound activity.
///
/// Keeps the raw document alongside the fields validation and routing
/// need; application-level processing receives the raw document.
#[derive(Debug, Clone)]
pub struct Activity {
    /// Handled activity kind.
    pub kind: ActivityKind,
    /// Activity id, when the sender supplied one.
    pub id: Option<String>,
    /// The actor the activity claims to be from.
    pub actor: Url,
    /// The activity object (may itself be a document or a bare IRI).
    pub object: Option<Value>,
    /// `to` addressing.
    pub to: Vec<String>,
    /// `cc` addressing.
    pub cc: Vec<String>,
    raw: Value,
}

impl Activity {
    /// Decode a compacted activity document.
    ///
    /// Structural failures (no object, unhandled `type`, missing or
    /// malformed `actor`) are [`AppError::Structural`].
    pub fn from_json(document: &Value) -> AppResult<Self> {
        let obj = document
            .as_object()
            .ok_or_else(|| AppError::Structural("activity body is not an object".to_string()))?;

        let type_tag = obj
            .get("type")
            .and_then(type_tag_str)
            .ok_or_else(|| AppError::Structural("activity has no type".to_string()))?;

        let kind = ActivityKind::from_type_tag(type_tag).ok_or_else(|| {
            AppError::Structural(format!("unhandled activity type: {type_tag}"))
        })?;

        let actor_str = obj
            .get("actor")
            .and_then(actor_iri)
            .ok_or_else(|| AppError::Structural("activity has no actor".to_string()))?;
        let actor = Url::parse(actor_str)
            .map_err(|e| AppError::Structural(format!("invalid actor IRI: {e}")))?;

        Ok(Self {
            kind,
            id: obj.get("id").and_then(Value::as_str).map(String::from),
            actor,
            object: obj.get("object").cloned(),
            to: string_list(obj.get("to")),
            cc: string_list(obj.get("cc")),
            raw: document.clone(),
        })
    }

    /// The raw document as received.
    #[must_use]
    pub const fn raw(&self) -> &Value {
        &self.raw
    }

    /// Host of the claimed actor.
    #[must_use]
    pub fn actor_host(&self) -> Option<&str> {
        self.actor.host_str()
    }

    /// Whether this is a `Delete` (validation treats these specially).
    #[must_use]
    pub fn is_delete(&self) -> bool {
        self.kind == ActivityKind::Delete
    }

    /// Whether this is a `Follow` (fan-out treats these specially).
    #[must_use]
    pub fn is_follow(&self) -> bool {
        self.kind == ActivityKind::Follow
    }
}

/// `type` may be a string or an array of strings; take the first handled tag.
fn type_tag_str(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s.as_str()),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .find(|tag| ActivityKind::from_type_tag(tag).is_some())
            .or_else(|| items.first().and_then(Value::as_str)),
        _ => None,
    }
}

/// `actor` may be a bare IRI or an embedded object with an `id`.
fn actor_iri(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(o) => o.get("id").and_then(Value::as_str),
        _ => None,
    }
}

/// `to`/`cc` may be a single IRI or a list.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}
