//! Storage traits (spec.md §3/§6) plus two implementations: `mongo` against a
//! live MongoDB deployment and `memory` in-process fakes for tests.
//!
//! This crate never decides business logic — it persists and atomically
//! transitions whatever `state-manager-engine` tells it to. See
//! `state-manager-core` for the pure domain model these traits move around.

pub mod encryption;
pub mod error;
pub mod indexes;
pub mod memory;
pub mod mongo;
pub mod store;

pub use error::StoreError;
pub use store::{
    ClaimFilter, GraphTemplateStore, RegisteredNodeStore, RunStore, StateStore, StateUpdate,
    TriggerStore,
};
