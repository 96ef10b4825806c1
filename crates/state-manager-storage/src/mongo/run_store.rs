use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::options::{FindOptions, InsertManyOptions};
use mongodb::{Collection, Database};
use tracing::instrument;

use state_manager_core::model::{Run, RunId, Store};

use super::collection_names;
use crate::error::StoreError;
use crate::store::RunStore;

/// One document per `(run_id, key)` store slot, matching
/// `original_source`'s `app/models/db/store.py` row-per-key layout.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StoreSlot {
    run_id: String,
    key: String,
    value: String,
}

#[derive(Clone)]
pub struct MongoRunStore {
    runs: Collection<Run>,
    stores: Collection<StoreSlot>,
}

impl MongoRunStore {
    pub fn new(db: &Database) -> Self {
        Self {
            runs: db.collection(collection_names::RUNS),
            stores: db.collection(collection_names::STORES),
        }
    }
}

#[async_trait]
impl RunStore for MongoRunStore {
    #[instrument(skip(self, run, store))]
    async fn create(&self, run: Run, store: Store) -> Result<Run, StoreError> {
        self.runs.insert_one(&run).await?;

        if !store.values.is_empty() {
            let slots: Vec<StoreSlot> = store
                .values
                .iter()
                .map(|(key, value)| StoreSlot {
                    run_id: run.run_id.as_str().to_string(),
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect();
            let options = InsertManyOptions::builder().ordered(false).build();
            self.stores.insert_many(slots).with_options(options).await?;
        }

        Ok(run)
    }

    #[instrument(skip(self))]
    async fn get_store(&self, run_id: &RunId) -> Result<Store, StoreError> {
        let cursor = self.stores.find(doc! { "run_id": run_id.as_str() }).await?;
        let slots: Vec<StoreSlot> = cursor.try_collect().await?;
        Ok(Store {
            run_id: run_id.clone(),
            values: slots.into_iter().map(|s| (s.key, s.value)).collect(),
        })
    }

    #[instrument(skip(self))]
    async fn list_runs(
        &self,
        namespace: &str,
        page: u32,
        size: u32,
    ) -> Result<(Vec<Run>, u64), StoreError> {
        let query = doc! { "namespace": namespace };
        let total = self.runs.count_documents(query.clone()).await?;

        let skip = (page.saturating_sub(1) as u64) * size as u64;
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .skip(skip)
            .limit(size as i64)
            .build();
        let cursor = self.runs.find(query).with_options(options).await?;
        let runs: Vec<Run> = cursor.try_collect().await?;
        Ok((runs, total))
    }
}
