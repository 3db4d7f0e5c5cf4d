//! Request middleware for federation routes.

pub mod concurrency;

pub use concurrency::ConcurrencyGuardLayer;
