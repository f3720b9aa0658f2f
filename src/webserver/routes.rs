/// HTTP route handlers
///
/// The surface is intentionally tiny: GET /health with a JSON status
/// document. Anything but GET on that path gets a 405 from the router.
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;

use crate::health::{CheckStatus, HealthChecker};

pub fn create_router(checker: Arc<HealthChecker>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(checker)
}

async fn health_handler(State(checker): State<Arc<HealthChecker>>) -> impl IntoResponse {
    let report = checker.check().await;

    let code = if report.status == CheckStatus::Error {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (code, Json(report))
}
