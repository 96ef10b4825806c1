//! `GET /health` (spec.md §6). Unauthenticated, unprefixed — same shape as
//! `everruns-api::main::health`.

use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub message: &'static str,
}

#[utoipa::path(get, path = "/health", responses((status = 200, description = "Service is up", body = HealthResponse)), tag = "health")]
pub(crate) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { message: "OK" })
}
