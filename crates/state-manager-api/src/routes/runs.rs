//! Read-only run/state query routes, nested under
//! `/v0/namespace/:namespace` (spec.md §6/§4.9).

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use state_manager_core::model::{RunId, State as StateModel, StateId};
use state_manager_engine::query::{
    get_node_details, list_runs, list_states_by_run, NodeDetails, RunsListResponse,
};

use crate::auth::ApiKeyAuth;
use crate::error::ApiResult;
use crate::AppState;

#[utoipa::path(get, path = "/v0/namespace/{namespace}/runs/{page}/{size}", responses((status = 200, description = "Runs page")), tag = "runs")]
pub(crate) async fn page(
    State(state): State<AppState>,
    Path((namespace, page, size)): Path<(String, u32, u32)>,
    _auth: ApiKeyAuth,
) -> ApiResult<RunsListResponse> {
    let response = list_runs(&state.ctx, &namespace, page, size).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct StatesQuery {
    identifier: Option<String>,
}

#[utoipa::path(get, path = "/v0/namespace/{namespace}/runs/{run_id}/states", responses((status = 200, description = "States in the run")), tag = "runs")]
pub(crate) async fn states(
    State(state): State<AppState>,
    Path((_namespace, run_id)): Path<(String, RunId)>,
    Query(q): Query<StatesQuery>,
    _auth: ApiKeyAuth,
) -> ApiResult<Vec<StateModel>> {
    let states = list_states_by_run(&state.ctx, &run_id, q.identifier.as_deref()).await?;
    Ok(Json(states))
}

#[utoipa::path(get, path = "/v0/namespace/{namespace}/runs/{run_id}/nodes/{state_id}", responses((status = 200, description = "Node details")), tag = "runs")]
pub(crate) async fn node(
    State(state): State<AppState>,
    Path((_namespace, run_id, state_id)): Path<(String, RunId, StateId)>,
    _auth: ApiKeyAuth,
) -> ApiResult<NodeDetails> {
    let details = get_node_details(&state.ctx, &run_id, &state_id).await?;
    Ok(Json(details))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/runs/:page/:size", get(page))
        .route("/runs/:run_id/states", get(states))
        .route("/runs/:run_id/nodes/:state_id", get(node))
}
