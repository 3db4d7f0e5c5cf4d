//! Repository layer.

mod following;
mod instance;
mod job;
mod user;
mod user_keypair;
mod worker;

pub use following::FollowingRepository;
pub use instance::InstanceRepository;
pub use job::JobRepository;
pub use user::UserRepository;
pub use user_keypair::UserKeypairRepository;
pub use worker::WorkerRepository;
