use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::graph::TriggerType;
use super::ids::TriggerId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TriggerStatus {
    Pending,
    Triggering,
    Triggered,
    Failed,
    Cancelled,
}

/// One row per future cron fire. Unique on
/// `(kind, expression, graph_name, namespace, trigger_time)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseTrigger {
    pub id: TriggerId,
    #[serde(rename = "type")]
    pub kind: TriggerType,
    pub expression: String,
    pub timezone: String,
    pub graph_name: String,
    pub namespace: String,
    pub trigger_time: DateTime<Utc>,
    pub trigger_status: TriggerStatus,
    pub expires_at: Option<DateTime<Utc>>,
}

impl DatabaseTrigger {
    pub fn unique_key(&self) -> (TriggerType, String, String, String, DateTime<Utc>) {
        (
            self.kind,
            self.expression.clone(),
            self.graph_name.clone(),
            self.namespace.clone(),
            self.trigger_time,
        )
    }
}
