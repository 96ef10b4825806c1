//! Storage traits (spec.md §3 persisted-state layout / §6 database contract).
//!
//! Grounded on `everruns-durable::persistence::store::WorkflowEventStore`'s
//! trait-per-concern shape: one trait per collection, `async_trait`-based,
//! returning `StoreError`. `mongo::*` implements these against `mongodb`;
//! `memory::*` implements them in-process for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use state_manager_core::model::{
    DatabaseTrigger, GraphTemplate, RegisteredNode, Run, RunId, State, StateId, StateStatus, Store,
    TriggerStatus,
};

use crate::error::StoreError;

/// A state row selected and atomically transitioned to `QUEUED` by `claim_created`.
#[derive(Debug, Clone)]
pub struct ClaimFilter {
    pub namespace: String,
    pub node_names: Vec<String>,
    pub batch_size: u32,
    pub now_ms: i64,
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Insert new `CREATED` states. Tolerant of individual duplicate-key
    /// rejections on `(run_id, identifier, fanout_id)` (spec.md §5 bulk
    /// insert contract) — callers that need strict all-or-nothing semantics
    /// check the returned count against the input length.
    async fn insert_many(&self, states: Vec<State>) -> Result<Vec<State>, StoreError>;

    async fn get(&self, id: &StateId) -> Result<State, StoreError>;

    /// Atomically select up to `filter.batch_size` `CREATED` states matching
    /// `node_names` with `enqueue_after <= now_ms`, transition each to
    /// `QUEUED` with `queued_at = now_ms`, FIFO by `(enqueue_after, created_at)`.
    /// A state can never be returned by two concurrent calls.
    async fn claim_created(&self, filter: ClaimFilter) -> Result<Vec<State>, StoreError>;

    /// Compare-and-set transition: succeeds only if the state's current
    /// status equals `expected`. Returns `StoreError::ConcurrencyConflict`
    /// (mapped to `InvalidState` by the engine) otherwise.
    async fn transition(
        &self,
        id: &StateId,
        expected: StateStatus,
        apply: StateUpdate,
    ) -> Result<State, StoreError>;

    async fn list_by_run(&self, run_id: &RunId, identifier: Option<&str>) -> Result<Vec<State>, StoreError>;

    /// States matching `(identifier, parents[ancestor_identifier] == ancestor_state_id)`
    /// whose status is not `SUCCESS` — the join-check query of spec.md §4.5 step 3a.
    async fn count_unsettled_siblings(
        &self,
        namespace: &str,
        graph_name: &str,
        identifier: &str,
        ancestor_identifier: &str,
        ancestor_state_id: &StateId,
    ) -> Result<u64, StoreError>;

    /// `QUEUED` states whose `queued_at + timeout_minutes*60_000 <= now_ms`.
    async fn queued_past_timeout(&self, now_ms: i64) -> Result<Vec<State>, StoreError>;

    /// `EXECUTED` states last touched before `older_than_ms` — candidates for
    /// the fan-out reconciliation sweep (spec.md §9 Open Question 2: a crash
    /// between marking a source state `EXECUTED` and materializing its
    /// children/marking it `SUCCESS` leaves it stranded here).
    async fn executed_stale(&self, older_than_ms: i64) -> Result<Vec<State>, StoreError>;
}

/// Fields a status transition is allowed to update alongside `status` itself.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub status: Option<StateStatus>,
    pub outputs: Option<std::collections::HashMap<String, serde_json::Value>>,
    pub error: Option<Option<String>>,
    pub queued_at: Option<Option<i64>>,
    pub retry_count: Option<u32>,
}

#[async_trait]
pub trait GraphTemplateStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<GraphTemplate, StoreError>;

    /// Insert-or-replace nodes/retry_policy/store_config/triggers, reset
    /// `validation_status` to `PENDING`, and return the persisted template
    /// together with the *previous* triggers (for cancellation diffing).
    async fn upsert(
        &self,
        template: GraphTemplate,
    ) -> Result<(GraphTemplate, Vec<state_manager_core::model::Trigger>), StoreError>;

    async fn set_validation_result(
        &self,
        namespace: &str,
        name: &str,
        status: state_manager_core::model::GraphValidationStatus,
        errors: Vec<String>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait RegisteredNodeStore: Send + Sync {
    async fn register(&self, nodes: Vec<RegisteredNode>) -> Result<Vec<RegisteredNode>, StoreError>;

    async fn list_for_template(
        &self,
        keys: &[(String, String)],
    ) -> Result<Vec<RegisteredNode>, StoreError>;

    async fn get(&self, namespace: &str, name: &str) -> Result<RegisteredNode, StoreError>;
}

#[async_trait]
pub trait RunStore: Send + Sync {
    async fn create(&self, run: Run, store: Store) -> Result<Run, StoreError>;

    async fn get_store(&self, run_id: &RunId) -> Result<Store, StoreError>;

    async fn list_runs(
        &self,
        namespace: &str,
        page: u32,
        size: u32,
    ) -> Result<(Vec<Run>, u64), StoreError>;
}

#[async_trait]
pub trait TriggerStore: Send + Sync {
    /// Atomic `findAndModify`: select one `PENDING` row with `trigger_time <=
    /// cron_time`, set it to `TRIGGERING`, and return the post-update row.
    async fn claim_due(&self, cron_time: DateTime<Utc>) -> Result<Option<DatabaseTrigger>, StoreError>;

    async fn set_status(
        &self,
        id: &str,
        status: TriggerStatus,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    /// Insert a new `PENDING` row; duplicate-key on the unique
    /// `(type, expression, graph_name, namespace, trigger_time)` index is
    /// surfaced as `StoreError::DuplicateKey` so the caller can log-and-ignore.
    async fn insert_pending(&self, trigger: DatabaseTrigger) -> Result<(), StoreError>;

    async fn cancel_pending(
        &self,
        graph_name: &str,
        namespace: &str,
        expressions: &[String],
        expires_at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Startup reconciliation: mark leftover `{TRIGGERED, FAILED}` rows with
    /// `expires_at = null` as `CANCELLED` with a fresh expiry.
    async fn reconcile_dangling(&self, expires_at: DateTime<Utc>) -> Result<u64, StoreError>;
}
