pub mod arguments;
pub mod collector;
pub mod config;
pub mod database;
pub mod erc20;
pub mod errors;
pub mod health;
pub mod logger;
pub mod rpc;
pub mod run;
pub mod scheduler;
pub mod shutdown;
pub mod units;
pub mod utils;
pub mod webserver;

pub use collector::Collector;
pub use config::Config;
pub use database::Store;
pub use erc20::TokenClient;
pub use health::HealthChecker;
pub use rpc::FailoverClient;
pub use scheduler::Scheduler;
