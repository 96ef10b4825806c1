//! Maps `ManagerError` (spec.md §7) onto HTTP responses. Grounded on
//! `control-plane::auth::middleware::AuthError`'s `IntoResponse` pattern:
//! a thin newtype wrapper with a `(StatusCode, message)` match, serialized
//! as `{"error": "..."}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use state_manager_core::ManagerError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub struct ApiError(pub ManagerError);

impl From<ManagerError> for ApiError {
    fn from(e: ManagerError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self.0 {
            ManagerError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ManagerError::InvalidState(m) => (StatusCode::BAD_REQUEST, m),
            ManagerError::InvalidInput(m) => (StatusCode::BAD_REQUEST, m),
            ManagerError::Conflict(m) => (StatusCode::CONFLICT, m),
            ManagerError::PreconditionFailed(m) => (StatusCode::BAD_REQUEST, m),
            ManagerError::Internal(m) => {
                tracing::error!(error = %m, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;
