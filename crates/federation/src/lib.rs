//! ActivityPub federation for sparrow.
//!
//! This crate implements the inbound and outbound federation surface:
//!
//! - **Activities**: a closed union over the handled activity kinds
//! - **Validation**: the HTTP-Signature / LD-Signature security boundary
//!   in front of the inbox queue
//! - **Resolution**: remote actor and signing-key lookup with caching
//! - **Signing**: outbound HTTP signatures and embedded LD signatures
//! - **Middleware**: the inbound concurrency guard
//! - **Handlers**: the shared and per-user inbox endpoints

pub mod activity;
pub mod client;
pub mod handler;
pub mod inbox_validation;
pub mod jsonld;
pub mod ld_signature;
pub mod middleware;
pub mod outbound;
pub mod resolver;
pub mod signature;

pub use activity::{Activity, ActivityKind};
pub use client::{ApClient, ApClientError};
pub use handler::{InboxState, shared_inbox_handler, user_inbox_handler};
pub use inbox_validation::{InboxValidator, ValidatedRequest, ValidationOutcome};
pub use middleware::ConcurrencyGuardLayer;
pub use outbound::ActivityBuilder;
pub use resolver::{ActorResolver, ResolvedKey};
pub use signature::{HttpSigner, HttpVerifier};
