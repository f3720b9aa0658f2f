pub mod failover;
pub mod retry;

pub use failover::FailoverClient;
pub use retry::with_failover;
