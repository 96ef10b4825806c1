//! `x-api-key` authentication (spec.md §6: "Authentication is a required
//! `x-api-key` header matching the configured `state_manager_secret`").
//!
//! Grounded on `control-plane::auth::middleware::AuthUser`'s
//! `FromRequestParts` extractor shape, trimmed down from its
//! JWT/cookie/API-key-lookup trio to the single static shared secret
//! spec.md describes — there is no per-caller identity here, just "does
//! the header match the configured value".

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::ErrorBody;
use crate::AppState;

const API_KEY_HEADER: &str = "x-api-key";

pub struct AuthError(String);

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, Json(ErrorBody { error: self.0 })).into_response()
    }
}

/// Zero-sized extractor: reject the request before the handler runs unless
/// `x-api-key` matches `Settings::state_manager_secret`. Handlers that need
/// it merely list `_auth: ApiKeyAuth` among their extractors.
pub struct ApiKeyAuth;

#[axum::async_trait]
impl FromRequestParts<AppState> for ApiKeyAuth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AuthError(format!("missing required '{API_KEY_HEADER}' header")))?;

        if provided != state.ctx.settings.state_manager_secret {
            return Err(AuthError("invalid API key".to_string()));
        }

        Ok(ApiKeyAuth)
    }
}
