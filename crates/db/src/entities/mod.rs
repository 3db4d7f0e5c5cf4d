//! Entity definitions.

#![allow(missing_docs)]

pub mod following;
pub mod instance;
pub mod job;
pub mod user;
pub mod user_keypair;
pub mod worker;

pub use following::Entity as Following;
pub use instance::Entity as Instance;
pub use job::Entity as Job;
pub use user::Entity as User;
pub use user_keypair::Entity as UserKeypair;
pub use worker::Entity as Worker;
