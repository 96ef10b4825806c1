//! Fan-out / join engine (spec.md §4.5). Grounded step-for-step on
//! `original_source/.../tasks/create_next_states.py`'s `create_next_states`;
//! the async task structure follows
//! `everruns-durable::engine::executor::WorkflowExecutor`.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use state_manager_core::model::{
    GraphTemplate, GraphValidationStatus, NodeTemplate, State, StateId, StateStatus,
};
use state_manager_core::ManagerError;
use state_manager_storage::store::StateUpdate;

use crate::context::EngineContext;
use crate::resolve::resolve_ancestor_refs;

/// Poll-wait cadence and ceiling for a graph template stuck `PENDING`/
/// `ONGOING` (spec.md §4.5 step 1).
const VALIDATION_POLL_INTERVAL: Duration = Duration::from_secs(1);
const VALIDATION_POLL_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Process one fan-out job: `state_ids` are sibling states that all just
/// reached `EXECUTED` together (spec.md §4.4 `executed`). Failures are
/// swallowed here and surfaced only by marking the affected source state(s)
/// `ERRORED` (spec.md §7 "background fan-out/retry failures are surfaced by
/// writing `ERRORED` on the source state and logging").
#[instrument(skip(ctx))]
pub async fn run(ctx: &EngineContext, state_ids: Vec<StateId>) {
    let mut sources = Vec::with_capacity(state_ids.len());
    for id in &state_ids {
        match ctx.states.get(id).await {
            Ok(s) => sources.push(s),
            Err(e) => {
                error!(state_id = %id, error = %e, "fanout could not load source state");
            }
        }
    }
    if sources.is_empty() {
        return;
    }

    let first = &sources[0];
    let (namespace, graph_name, identifier) = (
        first.namespace.clone(),
        first.graph_name.clone(),
        first.identifier.clone(),
    );

    let template = match wait_for_valid_template(ctx, &namespace, &graph_name).await {
        Ok(t) => t,
        Err(e) => {
            for s in &sources {
                mark_errored(ctx, &s.id, &e.to_string()).await;
            }
            return;
        }
    };

    let Some(node) = template.node_by_identifier(&identifier) else {
        for s in &sources {
            mark_errored(
                ctx,
                &s.id,
                &format!("node template for identifier '{identifier}' no longer exists"),
            )
            .await;
        }
        return;
    };

    if node.next_nodes.is_empty() {
        for s in &sources {
            succeed(ctx, &s.id).await;
        }
        return;
    }

    let mut new_states = Vec::new();
    let mut errored_sources: HashMap<StateId, String> = HashMap::new();

    for s in &sources {
        if errored_sources.contains_key(&s.id) {
            continue;
        }

        let mut ancestors = HashMap::with_capacity(s.parents.len());
        let mut load_failed = false;
        for id in s.parents.values() {
            match ctx.states.get(id).await {
                Ok(ancestor) => {
                    ancestors.insert(ancestor.identifier.clone(), ancestor);
                }
                Err(e) => {
                    errored_sources.insert(s.id.clone(), format!("failed to load ancestor state {id}: {e}"));
                    load_failed = true;
                    break;
                }
            }
        }
        if load_failed {
            continue;
        }

        for next_id in &node.next_nodes {
            let Some(successor) = template.node_by_identifier(next_id) else {
                errored_sources.insert(
                    s.id.clone(),
                    format!("successor node '{next_id}' no longer exists in the template"),
                );
                break;
            };

            if let Some(unites) = &successor.unites {
                match join_satisfied(ctx, &template, &namespace, &graph_name, s, &unites.identifier).await {
                    Ok(true) => {}
                    Ok(false) => continue, // join not satisfied yet; re-evaluated when the sibling completes
                    Err(e) => {
                        errored_sources.insert(s.id.clone(), e);
                        break;
                    }
                }
            }

            match build_successor_state(s, successor, &ancestors) {
                Ok(new_state) => new_states.push(new_state),
                Err(e) => {
                    errored_sources.insert(s.id.clone(), e);
                    break;
                }
            }
        }
    }

    if !new_states.is_empty() {
        match ctx.states.insert_many(new_states).await {
            Ok(inserted) => info!(count = inserted.len(), %graph_name, "fanout created successor states"),
            Err(e) => {
                error!(error = %e, "fanout failed to bulk-insert successor states");
                for s in &sources {
                    mark_errored(ctx, &s.id, &format!("failed to create successor states: {e}")).await;
                }
                return;
            }
        }
    }

    for s in &sources {
        if let Some(msg) = errored_sources.get(&s.id) {
            mark_errored(ctx, &s.id, msg).await;
        } else {
            succeed(ctx, &s.id).await;
        }
    }
}

/// Step 1: poll-wait for the template to leave `PENDING`/`ONGOING`.
async fn wait_for_valid_template(
    ctx: &EngineContext,
    namespace: &str,
    graph_name: &str,
) -> Result<GraphTemplate, ManagerError> {
    let deadline = tokio::time::Instant::now() + VALIDATION_POLL_TIMEOUT;
    loop {
        let template = ctx.graphs.get(namespace, graph_name).await?;
        match template.validation_status {
            GraphValidationStatus::Valid => return Ok(template),
            GraphValidationStatus::Invalid => {
                return Err(ManagerError::PreconditionFailed(format!(
                    "graph {namespace}/{graph_name} is INVALID: {:?}",
                    template.validation_errors
                )));
            }
            GraphValidationStatus::Pending | GraphValidationStatus::Ongoing => {
                if tokio::time::Instant::now() >= deadline {
                    return Err(ManagerError::PreconditionFailed(format!(
                        "graph {namespace}/{graph_name} did not reach VALID within the poll-wait window"
                    )));
                }
                tokio::time::sleep(VALIDATION_POLL_INTERVAL).await;
            }
        }
    }
}

/// Step 3a: the join check. `ancestor_id` is `unites.identifier`. The
/// concrete fan-out instance siblings must share is found by walking up to
/// `ancestor_id`'s own predecessor in the template and reading that
/// identifier out of `s.parents` (or `s.id` itself, when `s` *is* that
/// predecessor) — this is what makes cross-branch completions not
/// cross-count (spec.md §4.5 "Correctness note on joins").
async fn join_satisfied(
    ctx: &EngineContext,
    template: &GraphTemplate,
    namespace: &str,
    graph_name: &str,
    s: &State,
    ancestor_id: &str,
) -> Result<bool, String> {
    let pred = predecessor_of(template, ancestor_id).unwrap_or(ancestor_id);
    let ancestor_state_id = if s.identifier == pred {
        s.id.clone()
    } else {
        s.parents
            .get(pred)
            .cloned()
            .ok_or_else(|| format!("state for identifier '{pred}' not found among '{}'s parents", s.identifier))?
    };

    let unsettled = ctx
        .states
        .count_unsettled_siblings(namespace, graph_name, ancestor_id, pred, &ancestor_state_id)
        .await
        .map_err(|e| e.to_string())?;

    Ok(unsettled == 0)
}

fn predecessor_of<'a>(template: &'a GraphTemplate, identifier: &str) -> Option<&'a str> {
    template
        .nodes
        .iter()
        .find(|n| n.next_nodes.iter().any(|next| next == identifier))
        .map(|n| n.identifier.as_str())
}

/// Step 3b/3c/3d: resolve inputs and propagate parents for one successor.
/// `ancestors` holds every state in `s.parents`, keyed by identifier, so a
/// successor's input can reference any ancestor on the path, not just `s`
/// itself.
fn build_successor_state(
    s: &State,
    successor: &NodeTemplate,
    ancestors: &HashMap<String, State>,
) -> Result<State, String> {
    let mut inputs = HashMap::with_capacity(successor.inputs.len());
    for (field, raw) in &successor.inputs {
        let resolved = resolve_ancestor_refs(raw, s, ancestors)
            .map_err(|e| format!("input '{field}' on node '{}': {e}", successor.identifier))?;
        inputs.insert(field.clone(), resolved);
    }

    let mut parents = s.parents.clone();
    parents.insert(s.identifier.clone(), s.id.clone());

    Ok(State {
        id: StateId::new(""),
        run_id: s.run_id.clone(),
        graph_name: s.graph_name.clone(),
        namespace: s.namespace.clone(),
        node_name: successor.node_name.clone(),
        identifier: successor.identifier.clone(),
        status: StateStatus::Created,
        inputs,
        outputs: HashMap::new(),
        error: None,
        parents,
        // Inherited, not regenerated: this is what keeps the successor's
        // natural key `(run_id, identifier, fanout_id)` distinct per
        // fan-out branch without engine-wide coordination.
        fanout_id: s.fanout_id.clone(),
        does_unites: successor.unites.is_some(),
        retry_count: 0,
        enqueue_after: Utc::now().timestamp_millis(),
        timeout_minutes: None,
        queued_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    })
}

async fn succeed(ctx: &EngineContext, id: &StateId) {
    if let Err(e) = ctx
        .states
        .transition(id, StateStatus::Executed, StateUpdate {
            status: Some(StateStatus::Success),
            ..Default::default()
        })
        .await
    {
        warn!(state_id = %id, error = %e, "failed to mark source state SUCCESS");
    }
}

async fn mark_errored(ctx: &EngineContext, id: &StateId, message: &str) {
    error!(state_id = %id, error = message, "fanout error; marking source state ERRORED");
    if let Err(e) = ctx
        .states
        .transition(id, StateStatus::Executed, StateUpdate {
            status: Some(StateStatus::Errored),
            error: Some(Some(message.to_string())),
            ..Default::default()
        })
        .await
    {
        warn!(state_id = %id, error = %e, "failed to mark source state ERRORED");
    }
}
