//! MongoDB-backed implementations of the storage traits (spec.md §6
//! "Persisted state layout" / "Database contract"). Grounded on
//! `everruns-durable::persistence::postgres::PostgresWorkflowEventStore`'s
//! trait-impl shape (one struct per collection wrapping a shared handle,
//! `#[instrument]`'d methods translating driver errors into `StoreError`),
//! re-pointed at the `mongodb` driver since spec.md's database contract is
//! explicitly document-store shaped (`findAndModify`, TTL indexes, tolerant
//! bulk insert) rather than relational.
//!
//! Application ids (`StateId`/`RunId`/`TriggerId`, all opaque strings in
//! `state-manager-core`) are stored under an `id` field distinct from
//! Mongo's own `_id` ObjectId, so this layer never needs to round-trip
//! through `bson::oid::ObjectId::parse_str` — ids are generated here with
//! `uuid::Uuid::new_v4()` before insert.

pub mod graph_store;
pub mod registered_node_store;
pub mod run_store;
pub mod state_store;
pub mod trigger_store;

pub use graph_store::MongoGraphTemplateStore;
pub use registered_node_store::MongoRegisteredNodeStore;
pub use run_store::MongoRunStore;
pub use state_store::MongoStateStore;
pub use trigger_store::MongoTriggerStore;

/// Collection names (spec.md §6): `states`, `graph_templates`,
/// `registered_nodes`, `stores`, `runs`, `triggers`.
pub mod collection_names {
    pub const STATES: &str = "states";
    pub const GRAPH_TEMPLATES: &str = "graph_templates";
    pub const REGISTERED_NODES: &str = "registered_nodes";
    pub const STORES: &str = "stores";
    pub const RUNS: &str = "runs";
    pub const TRIGGERS: &str = "triggers";
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
