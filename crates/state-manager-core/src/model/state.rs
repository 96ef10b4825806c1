use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{RunId, StateId};

/// One attempt of one instance of a node within a run.
///
/// Status transitions are restricted to the graph in spec.md §3:
/// `CREATED -> QUEUED -> {EXECUTED, ERRORED, TIMEDOUT}`, plus the
/// `RETRY_CREATED` terminal written only by `manual_retry`, and `SUCCESS`
/// written only by the fan-out engine after an `EXECUTED` state's
/// descendants have all been materialized.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum StateStatus {
    Created,
    Queued,
    Executed,
    Success,
    Errored,
    Timedout,
    RetryCreated,
}

impl StateStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StateStatus::Success
                | StateStatus::Errored
                | StateStatus::Timedout
                | StateStatus::RetryCreated
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub id: StateId,
    pub run_id: RunId,
    pub graph_name: String,
    pub namespace: String,
    pub node_name: String,
    pub identifier: String,
    pub status: StateStatus,
    #[serde(default)]
    pub inputs: HashMap<String, String>,
    #[serde(default)]
    pub outputs: HashMap<String, Value>,
    pub error: Option<String>,
    /// ancestor identifier -> exact parent State.id on the path taken to reach this state.
    #[serde(default)]
    pub parents: HashMap<String, StateId>,
    /// Stable key distinguishing sibling fan-out states from one another.
    pub fanout_id: String,
    pub does_unites: bool,
    #[serde(default)]
    pub retry_count: u32,
    /// wall-clock ms; a CREATED state is only claimable once `now_ms >= enqueue_after`.
    pub enqueue_after: i64,
    pub timeout_minutes: Option<u32>,
    pub queued_at: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl State {
    /// `(run_id, identifier, fanout_id)` is the natural key enforced by a unique index.
    pub fn natural_key(&self) -> (RunId, String, String) {
        (self.run_id.clone(), self.identifier.clone(), self.fanout_id.clone())
    }
}
