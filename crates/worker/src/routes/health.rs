//! Liveness probe for the worker process.

use axum::Json;
use serde::Serialize;

/// Service name reported on `/health`.
pub const SERVICE_NAME: &str = "logistics-worker";

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// `GET /health`: answers as long as the HTTP server is up.
pub async fn check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
    })
}
