use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use state_manager_core::model::{Run, RunId, Store};

use crate::error::StoreError;
use crate::store::RunStore;

#[derive(Default)]
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<RunId, Run>>,
    stores: RwLock<HashMap<RunId, Store>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn create(&self, run: Run, store: Store) -> Result<Run, StoreError> {
        self.runs.write().insert(run.run_id.clone(), run.clone());
        self.stores.write().insert(run.run_id.clone(), store);
        Ok(run)
    }

    async fn get_store(&self, run_id: &RunId) -> Result<Store, StoreError> {
        self.stores
            .read()
            .get(run_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("store for run {run_id}")))
    }

    async fn list_runs(
        &self,
        namespace: &str,
        page: u32,
        size: u32,
    ) -> Result<(Vec<Run>, u64), StoreError> {
        let guard = self.runs.read();
        let mut matching: Vec<Run> = guard
            .values()
            .filter(|r| r.namespace == namespace)
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.created_at);
        matching.reverse();

        let total = matching.len() as u64;
        let start = (page.saturating_sub(1) as usize) * size as usize;
        let page_items = matching.into_iter().skip(start).take(size as usize).collect();
        Ok((page_items, total))
    }
}
