//! HTTP handlers for federation endpoints.

pub mod inbox;

pub use inbox::{InboxState, shared_inbox_handler, user_inbox_handler};
