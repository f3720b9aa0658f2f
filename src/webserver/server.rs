/// Health endpoint server lifecycle
///
/// Binds the configured port, serves until the global shutdown fires, then
/// terminates gracefully. The caller bounds the final drain with its own
/// deadline.
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::health::HealthChecker;
use crate::logger::{log, LogTag};
use crate::shutdown::wait_for_shutdown;
use crate::webserver::routes;

pub async fn start_server(port: u16, checker: Arc<HealthChecker>) -> Result<()> {
    let app = routes::create_router(checker);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind health server to {addr}"))?;

    log(
        LogTag::Webserver,
        "INFO",
        &format!("Health server listening on :{port} (GET /health)"),
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await
        .context("Health server error")?;

    log(LogTag::Webserver, "INFO", "Health server stopped");
    Ok(())
}
