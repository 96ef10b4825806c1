//! Shared collaborators wired together once at startup and handed to every
//! engine component — the Design Note's "construct at startup, pass via a
//! small `App` struct" response to the source's global-singleton pattern.

use std::sync::Arc;

use tokio::sync::mpsc;

use state_manager_core::config::Settings;
use state_manager_core::model::StateId;
use state_manager_storage::encryption::SecretsCipher;
use state_manager_storage::store::{
    GraphTemplateStore, RegisteredNodeStore, RunStore, StateStore, TriggerStore,
};

use crate::schema_cache::SchemaCache;
use crate::validation_task::ValidationRequest;

/// A fan-out invocation enqueued as an explicit durable step (Design Note:
/// "make the fan-out invocation an explicit durable step"). Carries the ids
/// of one or more sibling states that just reached `EXECUTED` together.
#[derive(Debug, Clone)]
pub struct FanoutJob {
    pub state_ids: Vec<StateId>,
}

#[derive(Clone)]
pub struct EngineContext {
    pub settings: Arc<Settings>,
    pub cipher: Arc<SecretsCipher>,
    pub states: Arc<dyn StateStore>,
    pub graphs: Arc<dyn GraphTemplateStore>,
    pub nodes: Arc<dyn RegisteredNodeStore>,
    pub runs: Arc<dyn RunStore>,
    pub triggers: Arc<dyn TriggerStore>,
    pub schema_cache: Arc<SchemaCache>,
    pub fanout_tx: mpsc::UnboundedSender<FanoutJob>,
    pub validation_tx: mpsc::UnboundedSender<ValidationRequest>,
}

impl EngineContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: Arc<Settings>,
        cipher: Arc<SecretsCipher>,
        states: Arc<dyn StateStore>,
        graphs: Arc<dyn GraphTemplateStore>,
        nodes: Arc<dyn RegisteredNodeStore>,
        runs: Arc<dyn RunStore>,
        triggers: Arc<dyn TriggerStore>,
        fanout_tx: mpsc::UnboundedSender<FanoutJob>,
        validation_tx: mpsc::UnboundedSender<ValidationRequest>,
    ) -> Self {
        Self {
            settings,
            cipher,
            states,
            graphs,
            nodes,
            runs,
            triggers,
            schema_cache: Arc::new(SchemaCache::new()),
            fanout_tx,
            validation_tx,
        }
    }

    /// Schedule a fan-out job without blocking the caller. The channel is
    /// unbounded and in-process only: a crash between `send` and the worker
    /// picking it up is covered by `reconcile`'s stale-`EXECUTED` sweep, not
    /// by this send itself.
    pub fn schedule_fanout(&self, state_ids: Vec<StateId>) {
        if state_ids.is_empty() {
            return;
        }
        let _ = self.fanout_tx.send(FanoutJob { state_ids });
    }

    /// Schedule asynchronous (re)validation of a graph template, same
    /// fire-and-forget shape as `schedule_fanout` (spec.md §4.3: validation
    /// never runs inline with the upsert).
    pub fn schedule_validation(&self, request: ValidationRequest) {
        let _ = self.validation_tx.send(request);
    }
}
