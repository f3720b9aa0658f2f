pub mod balances;
pub mod connection;
pub mod models;

pub use connection::Store;
pub use models::BalanceObservation;
