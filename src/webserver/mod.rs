mod routes;
mod server;

pub use server::start_server;
