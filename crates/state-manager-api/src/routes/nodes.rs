//! `POST /nodes/` (spec.md §6) — the one route with no `/v0/namespace/...`
//! prefix, since `runtime_namespace` travels in the request body rather than
//! the path.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use state_manager_engine::graph_template::{register_nodes, RegisterNodesRequest, RegisteredNodeKey};

use crate::auth::ApiKeyAuth;
use crate::error::ApiResult;
use crate::AppState;

#[utoipa::path(post, path = "/nodes/", responses((status = 200, description = "Nodes registered")), tag = "nodes")]
pub(crate) async fn register(
    State(state): State<AppState>,
    _auth: ApiKeyAuth,
    Json(request): Json<RegisterNodesRequest>,
) -> ApiResult<Vec<RegisteredNodeKey>> {
    let registered = register_nodes(&state.ctx, request).await?;
    Ok(Json(registered))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/nodes/", post(register))
}
