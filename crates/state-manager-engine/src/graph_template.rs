//! Graph template upsert / node registration (spec.md §4.2/§4.3, component
//! B). Grounded on `original_source/.../controller/upsert_graph_template.py`:
//! load-or-construct, reset validation to `PENDING`, replace the mutable
//! fields, encrypt only the secrets that are actually new, persist, then
//! schedule async validation carrying a snapshot of the previous triggers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use state_manager_core::model::{
    GraphTemplate, GraphValidationStatus, NodeTemplate, RegisteredNode, RetryPolicy, StoreConfig, Trigger,
};
use state_manager_core::ManagerError;

use crate::context::EngineContext;
use crate::validation_task::ValidationRequest;

#[derive(Debug, Clone, Deserialize)]
pub struct UpsertGraphTemplateRequest {
    pub nodes: Vec<NodeTemplate>,
    #[serde(default)]
    pub secrets: HashMap<String, String>,
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    #[serde(default)]
    pub store_config: StoreConfig,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
}

/// The wire view of a `GraphTemplate`: identical except `secrets` is
/// collapsed from ciphertext to a presence map (spec.md §4.2 "Secret values
/// are never returned; only `{name: true}` ... are").
#[derive(Debug, Clone, Serialize)]
pub struct GraphTemplateView {
    pub namespace: String,
    pub name: String,
    pub nodes: Vec<NodeTemplate>,
    pub retry_policy: RetryPolicy,
    pub store_config: StoreConfig,
    pub secrets: HashMap<String, bool>,
    pub triggers: Vec<Trigger>,
    pub validation_status: GraphValidationStatus,
    pub validation_errors: Vec<String>,
}

impl From<GraphTemplate> for GraphTemplateView {
    fn from(t: GraphTemplate) -> Self {
        Self {
            namespace: t.namespace,
            name: t.name,
            nodes: t.nodes,
            retry_policy: t.retry_policy,
            store_config: t.store_config,
            secrets: t.secrets.keys().map(|k| (k.clone(), true)).collect(),
            triggers: t.triggers,
            validation_status: t.validation_status,
            validation_errors: t.validation_errors,
        }
    }
}

#[instrument(skip(ctx, request))]
pub async fn upsert_graph_template(
    ctx: &EngineContext,
    namespace: &str,
    name: &str,
    request: UpsertGraphTemplateRequest,
) -> Result<GraphTemplateView, ManagerError> {
    let existing = ctx.graphs.get(namespace, name).await.ok();

    let mut secrets = existing.as_ref().map(|t| t.secrets.clone()).unwrap_or_default();
    for (secret_name, plaintext) in request.secrets {
        // Old secrets stay encrypted as-is; only names not already present
        // get a fresh ciphertext (spec.md §4.2).
        if secrets.contains_key(&secret_name) {
            continue;
        }
        let ciphertext = ctx
            .cipher
            .encrypt(&plaintext)
            .map_err(|e| ManagerError::Internal(format!("failed to encrypt secret '{secret_name}': {e}")))?;
        secrets.insert(secret_name, ciphertext);
    }

    let template = GraphTemplate {
        namespace: namespace.to_string(),
        name: name.to_string(),
        nodes: request.nodes,
        retry_policy: request.retry_policy,
        store_config: request.store_config,
        secrets,
        triggers: request.triggers,
        validation_status: GraphValidationStatus::Pending,
        validation_errors: Vec::new(),
    };

    let (persisted, previous_triggers) = ctx.graphs.upsert(template).await?;

    ctx.schema_cache.invalidate(namespace, name);
    ctx.schedule_validation(ValidationRequest {
        namespace: namespace.to_string(),
        name: name.to_string(),
        previous_triggers,
    });

    Ok(persisted.into())
}

#[instrument(skip(ctx))]
pub async fn get_graph_template(ctx: &EngineContext, namespace: &str, name: &str) -> Result<GraphTemplateView, ManagerError> {
    Ok(ctx.graphs.get(namespace, name).await?.into())
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterNodeSpec {
    pub name: String,
    pub inputs_schema: serde_json::Value,
    pub outputs_schema: serde_json::Value,
    #[serde(default)]
    pub secrets: Vec<String>,
    #[serde(default)]
    pub timeout_minutes: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterNodesRequest {
    pub runtime_name: String,
    pub runtime_namespace: String,
    pub nodes: Vec<RegisterNodeSpec>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisteredNodeKey {
    pub name: String,
    pub namespace: String,
}

/// `POST /nodes/` (spec.md §6). `runtime_name` is accepted and logged but
/// carries no further meaning here — ownership/identity of runtimes is the
/// separate "identity & project" service spec.md §1 explicitly excludes.
#[instrument(skip(ctx, request), fields(runtime = %request.runtime_name))]
pub async fn register_nodes(
    ctx: &EngineContext,
    request: RegisterNodesRequest,
) -> Result<Vec<RegisteredNodeKey>, ManagerError> {
    let nodes: Vec<RegisteredNode> = request
        .nodes
        .into_iter()
        .map(|n| RegisteredNode {
            name: n.name,
            namespace: request.runtime_namespace.clone(),
            inputs_schema: n.inputs_schema,
            outputs_schema: n.outputs_schema,
            secrets: n.secrets,
            timeout_minutes: n.timeout_minutes,
        })
        .collect();

    let registered = ctx.nodes.register(nodes).await?;
    Ok(registered
        .into_iter()
        .map(|n| RegisteredNodeKey { name: n.name, namespace: n.namespace })
        .collect())
}
