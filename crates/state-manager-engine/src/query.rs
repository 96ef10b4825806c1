//! Read-only query surface (spec.md §4.9, component I). Grounded on
//! `original_source/.../controller/{get_runs,get_node_run_details}.py`'s
//! shape (aggregate-by-run-id, single-row-by-id-with-stringified-parents);
//! both controllers there were left unfinished/best-effort in the source,
//! so the aggregation rule itself is taken from spec.md §4.9's prose rather
//! than incomplete source code.

use std::collections::HashMap;

use serde::Serialize;

use state_manager_core::model::{Run, RunId, RunStatus, RunSummary, State, StateId, StateStatus};
use state_manager_core::ManagerError;

use crate::context::EngineContext;

#[derive(Debug, Clone, Serialize)]
pub struct RunsListResponse {
    pub namespace: String,
    pub total: u64,
    pub page: u32,
    pub size: u32,
    pub runs: Vec<RunSummary>,
}

/// `GET /runs/{page}/{size}` (spec.md §6). Pages are 1-indexed, matching
/// the teacher's `everruns-api::runs::list_runs` convention.
pub async fn list_runs(
    ctx: &EngineContext,
    namespace: &str,
    page: u32,
    size: u32,
) -> Result<RunsListResponse, ManagerError> {
    let (runs, total) = ctx.runs.list_runs(namespace, page, size).await?;

    let mut summaries = Vec::with_capacity(runs.len());
    for run in runs {
        summaries.push(summarize_run(ctx, &run).await?);
    }

    Ok(RunsListResponse {
        namespace: namespace.to_string(),
        total,
        page,
        size,
        runs: summaries,
    })
}

async fn summarize_run(ctx: &EngineContext, run: &Run) -> Result<RunSummary, ManagerError> {
    let states = ctx.states.list_by_run(&run.run_id, None).await?;

    let mut success = 0u64;
    let mut errored = 0u64;
    let mut timedout = 0u64;
    let mut retried = 0u64;
    let mut all_terminal = true;
    let mut any_errored_or_timedout = false;
    let mut updated_at = run.created_at;

    for s in &states {
        if s.updated_at > updated_at {
            updated_at = s.updated_at;
        }
        if s.retry_count > 0 {
            retried += 1;
        }
        match s.status {
            StateStatus::Success => success += 1,
            StateStatus::Errored => {
                errored += 1;
                any_errored_or_timedout = true;
            }
            StateStatus::Timedout => {
                timedout += 1;
                any_errored_or_timedout = true;
            }
            _ => {}
        }
        if !s.status.is_terminal() {
            all_terminal = false;
        }
    }

    let total_count = states.len() as u64;
    let pending_count = total_count - success - errored - timedout;

    // spec.md §4.9: SUCCESS iff every state is terminal and all are SUCCESS;
    // FAILED if any terminal state is ERRORED/TIMEDOUT and none are pending;
    // otherwise PENDING.
    let status = if all_terminal && success == total_count {
        RunStatus::Success
    } else if any_errored_or_timedout && all_terminal {
        RunStatus::Failed
    } else {
        RunStatus::Pending
    };

    Ok(RunSummary {
        run_id: run.run_id.clone(),
        success_count: success,
        pending_count,
        errored_count: errored,
        retried_count: retried,
        timedout_count: timedout,
        total_count,
        status,
        created_at: run.created_at,
        updated_at,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeDetails {
    pub id: StateId,
    pub run_id: RunId,
    pub node_name: String,
    pub identifier: String,
    pub graph_name: String,
    pub namespace: String,
    pub status: StateStatus,
    pub inputs: HashMap<String, String>,
    pub outputs: HashMap<String, serde_json::Value>,
    pub error: Option<String>,
    /// ancestor identifier -> stringified parent state id (spec.md §4.9
    /// "parent ids stringified").
    pub parents: HashMap<String, String>,
    pub created_at: String,
    pub updated_at: String,
}

/// `GET /runs/{run_id}/states` (spec.md §6), optionally filtered by identifier.
pub async fn list_states_by_run(
    ctx: &EngineContext,
    run_id: &RunId,
    identifier: Option<&str>,
) -> Result<Vec<State>, ManagerError> {
    Ok(ctx.states.list_by_run(run_id, identifier).await?)
}

/// `GET /runs/{run_id}/nodes/{state_id}` (spec.md §6).
pub async fn get_node_details(ctx: &EngineContext, run_id: &RunId, state_id: &StateId) -> Result<NodeDetails, ManagerError> {
    let state = ctx.states.get(state_id).await?;
    if &state.run_id != run_id {
        return Err(ManagerError::NotFound(format!(
            "state {state_id} not found in run {run_id}"
        )));
    }

    let parents = state
        .parents
        .iter()
        .map(|(identifier, id)| (identifier.clone(), id.to_string()))
        .collect();

    Ok(NodeDetails {
        id: state.id,
        run_id: state.run_id,
        node_name: state.node_name,
        identifier: state.identifier,
        graph_name: state.graph_name,
        namespace: state.namespace,
        status: state.status,
        inputs: state.inputs,
        outputs: state.outputs,
        error: state.error,
        parents,
        created_at: state.created_at.to_rfc3339(),
        updated_at: state.updated_at.to_rfc3339(),
    })
}
