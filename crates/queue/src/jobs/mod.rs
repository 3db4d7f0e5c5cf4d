//! Job payload definitions.
//!
//! Payloads are stored as JSON on the job row; their field names are a
//! persistence format, not an internal detail.

#![allow(missing_docs)]

mod deliver;
mod inbox;
mod pre_deliver;

pub use deliver::{DELIVER_QUEUE, DeliverJobData};
pub use inbox::{INBOX_QUEUE, InboxJobData};
pub use pre_deliver::{PRE_DELIVER_QUEUE, PreDeliverJobData};
