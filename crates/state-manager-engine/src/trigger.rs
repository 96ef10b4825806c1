//! Graph triggering (spec.md §4.4 "trigger"). Grounded on
//! `original_source/.../controller/trigger_graph.py`: validate the template
//! is `VALID`, seed the run's `Store`, create a single `CREATED` state for
//! the graph's root node.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use state_manager_core::model::{
    GraphTemplate, GraphValidationStatus, NodeTemplate, Run, RunId, State, StateId, StateStatus,
};
use state_manager_core::ManagerError;

use crate::context::EngineContext;
use crate::resolve::seed_store;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TriggerRequest {
    #[serde(default)]
    pub store: HashMap<String, String>,
    /// Per-key overlay onto the root node's template inputs (spec.md §6);
    /// a key present here wins over the template's default for that key.
    #[serde(default)]
    pub inputs: HashMap<String, String>,
    /// Milliseconds to delay the root state's `enqueue_after` by (spec.md §6).
    #[serde(default)]
    pub start_delay: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TriggerResponse {
    pub status: StateStatus,
    pub run_id: RunId,
}

/// Find the graph's single root node: the one no other node's `next_nodes`
/// points to. The validator already guarantees exactly one exists.
fn root_node(template: &GraphTemplate) -> Option<&NodeTemplate> {
    template
        .nodes
        .iter()
        .find(|n| !template.nodes.iter().any(|m| m.next_nodes.iter().any(|next| next == &n.identifier)))
}

#[instrument(skip(ctx, request))]
pub async fn trigger_graph(
    ctx: &EngineContext,
    namespace: &str,
    graph_name: &str,
    request: TriggerRequest,
) -> Result<TriggerResponse, ManagerError> {
    let template = ctx.graphs.get(namespace, graph_name).await?;
    if template.validation_status != GraphValidationStatus::Valid {
        return Err(ManagerError::PreconditionFailed(format!(
            "graph {namespace}/{graph_name} is not VALID (status: {:?})",
            template.validation_status
        )));
    }
    let root = root_node(&template)
        .ok_or_else(|| ManagerError::Internal(format!("graph {namespace}/{graph_name} has no root node")))?;

    let run = Run {
        run_id: RunId::new(uuid::Uuid::new_v4().to_string()),
        graph_name: graph_name.to_string(),
        namespace: namespace.to_string(),
        created_at: Utc::now(),
    };
    let store = seed_store(
        &run,
        &template.store_config.required_keys,
        &template.store_config.default_values,
        &request.store,
    )?;
    let created_run = ctx.runs.create(run, store).await?;

    let now = Utc::now();
    let enqueue_after = now.timestamp_millis() + request.start_delay;

    // Caller-supplied `inputs` overlay the template's per-key, same as
    // `construct_inputs` in the original: a key present in the request wins,
    // everything else falls back to the root node's template default. Like
    // every other node's inputs, these are still `store.*`/ancestor
    // placeholders until resolved at claim time.
    let mut inputs = root.inputs.clone();
    inputs.extend(request.inputs.clone());

    let root_state = State {
        id: StateId::new(""),
        run_id: created_run.run_id.clone(),
        graph_name: graph_name.to_string(),
        namespace: namespace.to_string(),
        node_name: root.node_name.clone(),
        identifier: root.identifier.clone(),
        status: StateStatus::Created,
        inputs,
        outputs: HashMap::new(),
        error: None,
        parents: HashMap::new(),
        fanout_id: "f0".to_string(),
        does_unites: false,
        retry_count: 0,
        enqueue_after,
        timeout_minutes: None,
        queued_at: None,
        created_at: now,
        updated_at: now,
    };

    let inserted = ctx.states.insert_many(vec![root_state]).await?;
    let created = inserted
        .into_iter()
        .next()
        .ok_or_else(|| ManagerError::Internal("failed to create root state for new run".to_string()))?;

    Ok(TriggerResponse {
        status: created.status,
        run_id: created_run.run_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(identifier: &str, next: &[&str]) -> NodeTemplate {
        NodeTemplate {
            node_name: format!("node-{identifier}"),
            namespace: "ns".into(),
            identifier: identifier.into(),
            inputs: HashMap::new(),
            next_nodes: next.iter().map(|s| s.to_string()).collect(),
            unites: None,
        }
    }

    #[test]
    fn root_node_has_no_incoming_edges() {
        let template = GraphTemplate {
            namespace: "ns".into(),
            name: "g".into(),
            nodes: vec![node("A", &["B"]), node("B", &[])],
            retry_policy: Default::default(),
            store_config: Default::default(),
            secrets: HashMap::new(),
            triggers: Vec::new(),
            validation_status: GraphValidationStatus::Valid,
            validation_errors: Vec::new(),
        };
        assert_eq!(root_node(&template).unwrap().identifier, "A");
    }
}
