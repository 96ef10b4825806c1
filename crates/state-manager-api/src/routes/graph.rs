//! Graph template routes, nested under `/v0/namespace/:namespace` (spec.md
//! §6): upsert/get a template, and trigger a run of it.

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};

use state_manager_engine::graph_template::{
    get_graph_template, upsert_graph_template, GraphTemplateView, UpsertGraphTemplateRequest,
};
use state_manager_engine::trigger::{trigger_graph, TriggerRequest, TriggerResponse};

use crate::auth::ApiKeyAuth;
use crate::error::ApiResult;
use crate::AppState;

#[utoipa::path(put, path = "/v0/namespace/{namespace}/graph/{graph_name}", responses((status = 200, description = "Template upserted")), tag = "graph")]
pub(crate) async fn upsert(
    State(state): State<AppState>,
    Path((namespace, graph_name)): Path<(String, String)>,
    _auth: ApiKeyAuth,
    Json(request): Json<UpsertGraphTemplateRequest>,
) -> ApiResult<GraphTemplateView> {
    let view = upsert_graph_template(&state.ctx, &namespace, &graph_name, request).await?;
    Ok(Json(view))
}

#[utoipa::path(get, path = "/v0/namespace/{namespace}/graph/{graph_name}", responses((status = 200, description = "Template found")), tag = "graph")]
pub(crate) async fn get_template(
    State(state): State<AppState>,
    Path((namespace, graph_name)): Path<(String, String)>,
    _auth: ApiKeyAuth,
) -> ApiResult<GraphTemplateView> {
    let view = get_graph_template(&state.ctx, &namespace, &graph_name).await?;
    Ok(Json(view))
}

#[utoipa::path(post, path = "/v0/namespace/{namespace}/graph/{graph_name}/trigger", responses((status = 200, description = "Run created")), tag = "graph")]
pub(crate) async fn trigger(
    State(state): State<AppState>,
    Path((namespace, graph_name)): Path<(String, String)>,
    _auth: ApiKeyAuth,
    Json(request): Json<TriggerRequest>,
) -> ApiResult<TriggerResponse> {
    let response = trigger_graph(&state.ctx, &namespace, &graph_name, request).await?;
    Ok(Json(response))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/graph/:graph_name", put(upsert).get(get_template))
        .route("/graph/:graph_name/trigger", post(trigger))
}
