//! Durable Postgres-backed job queues for federation work.
//!
//! Three queues move an activity through the system: `inbox` applies
//! validated inbound activities, `preDeliver` fans one outbound
//! activity out into per-inbox jobs, and `deliver` performs the signed
//! HTTP POST to one remote inbox. Jobs survive restarts; retries are
//! scheduled by the workers themselves with exponential backoff.

pub mod delivery_impl;
pub mod jobs;
pub mod key_cache;
pub mod maintenance;
pub mod queue;
pub mod workers;

pub use delivery_impl::{QueueActivityDelivery, QueueInboxSink};
pub use jobs::{
    DELIVER_QUEUE, DeliverJobData, INBOX_QUEUE, InboxJobData, PRE_DELIVER_QUEUE, PreDeliverJobData,
};
pub use key_cache::{SigningKey, SigningKeyCache};
pub use maintenance::QueueMaintenance;
pub use queue::{JobEnqueuer, JobHandler, JobOutcome, JobQueue};
pub use workers::{DeliverWorker, InboxWorker, PreDeliverWorker};
