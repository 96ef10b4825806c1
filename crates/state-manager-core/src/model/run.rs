use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::RunId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: RunId,
    pub graph_name: String,
    pub namespace: String,
    pub created_at: DateTime<Utc>,
}

/// Per-run key/value slots seeded at trigger time, read-only afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Store {
    pub run_id: RunId,
    pub values: HashMap<String, String>,
}

impl Store {
    pub fn get(&self, key: &str) -> Option<&String> {
        self.values.get(key)
    }
}

/// Aggregated view over a run's states, used by the query surface.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Success,
    Failed,
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub success_count: u64,
    pub pending_count: u64,
    pub errored_count: u64,
    pub retried_count: u64,
    pub timedout_count: u64,
    pub total_count: u64,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
