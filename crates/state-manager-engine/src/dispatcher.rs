//! Dispatcher (spec.md §4.4): the four public operations a runtime client
//! drives a State through. Grounded on `everruns-durable::engine::executor`
//! for the CAS-transition/error-taxonomy shape and
//! `original_source/.../controller/errored_state.py` for the exact retry
//! math.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use state_manager_core::model::{State, StateId, StateStatus};
use state_manager_core::retry::{backoff_ms, should_retry};
use state_manager_core::ManagerError;
use state_manager_storage::store::{ClaimFilter, StateUpdate};
use state_manager_storage::StoreError;

use crate::context::EngineContext;
use crate::resolve::resolve_inputs_for_claim;

#[derive(Debug, Clone, Deserialize)]
pub struct EnqueueRequest {
    pub nodes: Vec<String>,
    pub batch_size: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClaimedState {
    #[serde(flatten)]
    pub state: State,
    /// `state.inputs` with every `store.<key>` placeholder substituted.
    pub resolved_inputs: HashMap<String, String>,
}

/// Claim up to `request.batch_size` `CREATED` states for the named nodes
/// and transition each to `QUEUED`. FIFO by `(enqueue_after, created_at)`
/// is enforced by the store's `claim_created`; a state lost to a racing
/// caller's CAS is simply absent from the result (spec.md §5).
#[instrument(skip(ctx))]
pub async fn enqueue(
    ctx: &EngineContext,
    namespace: &str,
    request: EnqueueRequest,
) -> Result<Vec<ClaimedState>, ManagerError> {
    let now_ms = Utc::now().timestamp_millis();
    let claimed = ctx
        .states
        .claim_created(ClaimFilter {
            namespace: namespace.to_string(),
            node_names: request.nodes,
            batch_size: request.batch_size,
            now_ms,
        })
        .await?;

    let mut out = Vec::with_capacity(claimed.len());
    for state in claimed {
        let store = ctx.runs.get_store(&state.run_id).await?;
        let resolved_inputs = resolve_inputs_for_claim(&state.inputs, &store)?;
        out.push(ClaimedState { state, resolved_inputs });
    }
    Ok(out)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutedRequest {
    pub outputs: Vec<HashMap<String, Value>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutedResponse {
    pub status: StateStatus,
}

/// `executed(state_id, outputs)` (spec.md §4.4). Zero outputs produces a
/// single `EXECUTED` state; N≥1 materializes N-1 fan-out siblings sharing
/// everything but `fanout_id`/`outputs`. The fan-out engine is scheduled for
/// every resulting id collectively, never per-state, so a join waiting on
/// this whole batch sees them settle together.
#[instrument(skip(ctx, request))]
pub async fn executed(
    ctx: &EngineContext,
    state_id: &StateId,
    request: ExecutedRequest,
) -> Result<ExecutedResponse, ManagerError> {
    let original = ctx.states.get(state_id).await?;

    let mut outputs_iter = request.outputs.into_iter();
    let first_outputs = outputs_iter.next().unwrap_or_default();

    let updated = ctx
        .states
        .transition(
            state_id,
            StateStatus::Queued,
            StateUpdate {
                status: Some(StateStatus::Executed),
                outputs: Some(first_outputs),
                ..Default::default()
            },
        )
        .await
        .map_err(map_transition_error)?;

    let mut siblings = Vec::new();
    for (i, outputs) in outputs_iter.enumerate() {
        siblings.push(State {
            id: StateId::new(""),
            fanout_id: format!("{}-fanout-{}", original.fanout_id, i + 1),
            outputs,
            status: StateStatus::Executed,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            ..updated.clone()
        });
    }

    let mut all_ids = vec![updated.id.clone()];
    if !siblings.is_empty() {
        let inserted = ctx.states.insert_many(siblings).await?;
        all_ids.extend(inserted.into_iter().map(|s| s.id));
    }

    ctx.schedule_fanout(all_ids);

    Ok(ExecutedResponse {
        status: StateStatus::Executed,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErroredRequest {
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErroredResponse {
    pub status: StateStatus,
    pub retry_created: bool,
}

/// `errored(state_id, error)` (spec.md §4.4). Grounded exactly on
/// `errored_state.py`'s backoff math: `enqueue_after = prev.enqueue_after +
/// backoff(policy, retry_count+1)`.
#[instrument(skip(ctx))]
pub async fn errored(
    ctx: &EngineContext,
    state_id: &StateId,
    request: ErroredRequest,
) -> Result<ErroredResponse, ManagerError> {
    let state = ctx
        .states
        .transition(
            state_id,
            StateStatus::Queued,
            StateUpdate {
                status: Some(StateStatus::Errored),
                error: Some(Some(request.error)),
                ..Default::default()
            },
        )
        .await
        .map_err(map_transition_error)?;

    let graph = ctx.graphs.get(&state.namespace, &state.graph_name).await?;
    let next_retry_count = state.retry_count + 1;

    let retry_created = if should_retry(&graph.retry_policy, state.retry_count) {
        let delay = backoff_ms(&graph.retry_policy, next_retry_count);
        let sibling = State {
            id: StateId::new(""),
            status: StateStatus::Created,
            // SPEC_FULL §9 Open Question 1: key retries by (original
            // identifier, retry_count) so a race between this call and the
            // timeout sweeper producing the same retry collides on the
            // natural-key unique index instead of double-creating it.
            fanout_id: format!("{}-retry-{}", state.fanout_id, next_retry_count),
            retry_count: next_retry_count,
            enqueue_after: state.enqueue_after + delay,
            queued_at: None,
            error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            ..state.clone()
        };
        let inserted = ctx.states.insert_many(vec![sibling]).await?;
        if inserted.is_empty() {
            warn!(state_id = %state_id, "retry state already existed (race with another caller)");
        }
        true
    } else {
        false
    };

    info!(state_id = %state_id, retry_created, "state errored");
    Ok(ErroredResponse {
        status: StateStatus::Errored,
        retry_created,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManualRetryRequest {
    pub fanout_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManualRetryResponse {
    pub id: StateId,
    pub status: StateStatus,
}

/// `manual_retry(state_id, fanout_id)` (spec.md §4.4). The caller supplies
/// the new sibling's `fanout_id`; a collision on the `(run_id, identifier,
/// fanout_id)` unique index is surfaced as `Conflict`.
#[instrument(skip(ctx))]
pub async fn manual_retry(
    ctx: &EngineContext,
    state_id: &StateId,
    request: ManualRetryRequest,
) -> Result<ManualRetryResponse, ManagerError> {
    let original = ctx.states.get(state_id).await?;

    let sibling = State {
        id: StateId::new(""),
        status: StateStatus::Created,
        fanout_id: request.fanout_id,
        outputs: HashMap::new(),
        error: None,
        queued_at: None,
        retry_count: original.retry_count,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        ..original.clone()
    };

    let inserted = ctx.states.insert_many(vec![sibling]).await?;
    let created = inserted.into_iter().next().ok_or_else(|| {
        ManagerError::Conflict(format!(
            "fanout_id already in use for run {} identifier {}",
            original.run_id, original.identifier
        ))
    })?;

    ctx.states
        .transition(
            state_id,
            original.status,
            StateUpdate {
                status: Some(StateStatus::RetryCreated),
                ..Default::default()
            },
        )
        .await
        .map_err(map_transition_error)?;

    Ok(ManualRetryResponse {
        id: created.id,
        status: StateStatus::Created,
    })
}

fn map_transition_error(e: StoreError) -> ManagerError {
    match e {
        StoreError::ConcurrencyConflict(msg) => ManagerError::InvalidState(msg),
        other => other.into(),
    }
}
