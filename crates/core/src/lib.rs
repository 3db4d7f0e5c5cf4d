//! Core business logic for sparrow.

pub mod services;

pub use services::*;

/// Generate a unique ID using ULID.
#[must_use]
pub fn generate_id() -> String {
    sparrow_common::IdGenerator::new().generate()
}
