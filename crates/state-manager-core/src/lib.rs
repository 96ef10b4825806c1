//! Domain model, placeholder resolver, graph validator, and retry math for
//! the distributed workflow state manager. Pure and storage-agnostic: this
//! crate never talks to a database or the network (see `state-manager-storage`
//! and `state-manager-engine` for that).

pub mod config;
pub mod error;
pub mod model;
pub mod placeholder;
pub mod retry;
pub mod validator;

pub use error::ManagerError;
