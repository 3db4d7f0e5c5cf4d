//! Common utilities and shared types for sparrow.
//!
//! This crate provides foundational components used across all sparrow crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **Cryptography**: RSA key generation for `ActivityPub` signatures
//! - **HTTP Signatures**: Implementation of HTTP Signatures for federation
//! - **Backoff**: The shared exponential-backoff-with-jitter retry schedule
//! - **ID Generation**: ULID-based unique identifiers via [`IdGenerator`]
//!
//! # Example
//!
//! ```no_run
//! use sparrow_common::{Config, IdGenerator, AppResult};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id_gen = IdGenerator::new();
//!     let id = id_gen.generate();
//!     println!("Generated ID: {}", id);
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod config;
pub mod crypto;
pub mod error;
pub mod http_signature;
pub mod id;

pub use backoff::BackoffSchedule;
pub use config::Config;
pub use crypto::{RsaKeypair, generate_rsa_keypair};
pub use error::{AppError, AppResult};
pub use http_signature::{
    HttpSignature, build_signing_string, calculate_digest, sign_request, verify_digest,
    verify_signature,
};
pub use id::IdGenerator;
