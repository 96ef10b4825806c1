//! State dispatcher routes, nested under `/v0/namespace/:namespace` (spec.md
//! §6 / §4.4): `enqueue`/`executed`/`errored`/`manual-retry`.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};

use state_manager_core::model::StateId;
use state_manager_engine::dispatcher::{
    enqueue, errored, executed, manual_retry, ClaimedState, EnqueueRequest, ErroredRequest, ErroredResponse,
    ExecutedRequest, ExecutedResponse, ManualRetryRequest, ManualRetryResponse,
};

use crate::auth::ApiKeyAuth;
use crate::error::ApiResult;
use crate::AppState;

#[utoipa::path(post, path = "/v0/namespace/{namespace}/states/enqueue", responses((status = 200, description = "States claimed")), tag = "states")]
pub(crate) async fn do_enqueue(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    _auth: ApiKeyAuth,
    Json(request): Json<EnqueueRequest>,
) -> ApiResult<Vec<ClaimedState>> {
    let claimed = enqueue(&state.ctx, &namespace, request).await?;
    Ok(Json(claimed))
}

#[utoipa::path(post, path = "/v0/namespace/{namespace}/states/{id}/executed", responses((status = 200, description = "State marked EXECUTED")), tag = "states")]
pub(crate) async fn do_executed(
    State(state): State<AppState>,
    Path((_namespace, id)): Path<(String, StateId)>,
    _auth: ApiKeyAuth,
    Json(request): Json<ExecutedRequest>,
) -> ApiResult<ExecutedResponse> {
    let response = executed(&state.ctx, &id, request).await?;
    Ok(Json(response))
}

#[utoipa::path(post, path = "/v0/namespace/{namespace}/states/{id}/errored", responses((status = 200, description = "State marked ERRORED")), tag = "states")]
pub(crate) async fn do_errored(
    State(state): State<AppState>,
    Path((_namespace, id)): Path<(String, StateId)>,
    _auth: ApiKeyAuth,
    Json(request): Json<ErroredRequest>,
) -> ApiResult<ErroredResponse> {
    let response = errored(&state.ctx, &id, request).await?;
    Ok(Json(response))
}

#[utoipa::path(post, path = "/v0/namespace/{namespace}/states/{id}/manual-retry", responses((status = 200, description = "Retry state created")), tag = "states")]
pub(crate) async fn do_manual_retry(
    State(state): State<AppState>,
    Path((_namespace, id)): Path<(String, StateId)>,
    _auth: ApiKeyAuth,
    Json(request): Json<ManualRetryRequest>,
) -> ApiResult<ManualRetryResponse> {
    let response = manual_retry(&state.ctx, &id, request).await?;
    Ok(Json(response))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/states/enqueue", post(do_enqueue))
        .route("/states/:id/executed", post(do_executed))
        .route("/states/:id/errored", post(do_errored))
        .route("/states/:id/manual-retry", post(do_manual_retry))
}
