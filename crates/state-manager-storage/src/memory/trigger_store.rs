use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use state_manager_core::model::{DatabaseTrigger, TriggerStatus, TriggerType};

use crate::error::StoreError;
use crate::store::TriggerStore;

#[derive(Default)]
pub struct InMemoryTriggerStore {
    triggers: RwLock<HashMap<String, DatabaseTrigger>>,
    next_id: RwLock<u64>,
}

impl InMemoryTriggerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_id(&self) -> String {
        let mut guard = self.next_id.write();
        *guard += 1;
        format!("trigger-{guard}")
    }
}

#[async_trait]
impl TriggerStore for InMemoryTriggerStore {
    async fn claim_due(&self, cron_time: DateTime<Utc>) -> Result<Option<DatabaseTrigger>, StoreError> {
        let mut guard = self.triggers.write();
        let due_id = guard
            .values()
            .filter(|t| t.trigger_status == TriggerStatus::Pending && t.trigger_time <= cron_time)
            .min_by_key(|t| t.trigger_time)
            .map(|t| t.id.as_str().to_string());

        let Some(id) = due_id else { return Ok(None) };
        let trigger = guard.get_mut(&id).expect("id came from this map");
        trigger.trigger_status = TriggerStatus::Triggering;
        Ok(Some(trigger.clone()))
    }

    async fn set_status(
        &self,
        id: &str,
        status: TriggerStatus,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let mut guard = self.triggers.write();
        let trigger = guard
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("trigger {id}")))?;
        trigger.trigger_status = status;
        trigger.expires_at = expires_at;
        Ok(())
    }

    async fn insert_pending(&self, mut trigger: DatabaseTrigger) -> Result<(), StoreError> {
        let mut guard = self.triggers.write();
        let duplicate = guard.values().any(|t| t.unique_key() == trigger.unique_key());
        if duplicate {
            return Err(StoreError::DuplicateKey(format!(
                "trigger {}/{} at {} already exists",
                trigger.graph_name, trigger.expression, trigger.trigger_time
            )));
        }
        if trigger.id.as_str().is_empty() {
            trigger.id = self.fresh_id().into();
        }
        guard.insert(trigger.id.as_str().to_string(), trigger);
        Ok(())
    }

    async fn cancel_pending(
        &self,
        graph_name: &str,
        namespace: &str,
        expressions: &[String],
        expires_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut guard = self.triggers.write();
        let mut count = 0u64;
        for trigger in guard.values_mut() {
            if trigger.graph_name == graph_name
                && trigger.namespace == namespace
                && trigger.kind == TriggerType::Cron
                && trigger.trigger_status == TriggerStatus::Pending
                && expressions.contains(&trigger.expression)
            {
                trigger.trigger_status = TriggerStatus::Cancelled;
                trigger.expires_at = Some(expires_at);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn reconcile_dangling(&self, expires_at: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut guard = self.triggers.write();
        let mut count = 0u64;
        for trigger in guard.values_mut() {
            let dangling = matches!(
                trigger.trigger_status,
                TriggerStatus::Triggered | TriggerStatus::Failed
            ) && trigger.expires_at.is_none();
            if dangling {
                trigger.trigger_status = TriggerStatus::Cancelled;
                trigger.expires_at = Some(expires_at);
                count += 1;
            }
        }
        Ok(count)
    }
}
