//! Business logic services.

#![allow(missing_docs)]

pub mod activity;
pub mod delivery;
pub mod instance;

pub use activity::{ActivityHandler, InboxSink, NoOpActivityHandler};
pub use delivery::{ActivityDelivery, DeliveryService, NoOpDelivery};
pub use instance::InstanceService;
