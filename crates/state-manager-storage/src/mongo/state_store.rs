use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, to_bson};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use mongodb::{Collection, Database};
use tracing::{debug, instrument, warn};

use state_manager_core::model::{RunId, State, StateId, StateStatus};

use super::{collection_names, new_id};
use crate::error::StoreError;
use crate::store::{ClaimFilter, StateStore, StateUpdate};

#[derive(Clone)]
pub struct MongoStateStore {
    collection: Collection<State>,
}

impl MongoStateStore {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(collection_names::STATES),
        }
    }
}

#[async_trait]
impl StateStore for MongoStateStore {
    #[instrument(skip(self, states))]
    async fn insert_many(&self, states: Vec<State>) -> Result<Vec<State>, StoreError> {
        let mut to_insert = states;
        for state in &mut to_insert {
            if state.id.as_str().is_empty() {
                state.id = StateId::new(new_id());
            }
        }
        if to_insert.is_empty() {
            return Ok(Vec::new());
        }

        // Unordered insert tolerates individual duplicate-key rejections
        // (spec.md §5): insert one at a time so a single conflict never
        // aborts the rest of the batch.
        let mut inserted = Vec::with_capacity(to_insert.len());
        for state in to_insert {
            match self.collection.insert_one(&state).await {
                Ok(_) => inserted.push(state),
                Err(e) => {
                    let store_err: StoreError = e.into();
                    if matches!(store_err, StoreError::DuplicateKey(_)) {
                        warn!(state_id = %state.id, "duplicate state skipped on insert_many");
                        continue;
                    }
                    return Err(store_err);
                }
            }
        }
        Ok(inserted)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &StateId) -> Result<State, StoreError> {
        self.collection
            .find_one(doc! { "id": id.as_str() })
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("state {id}")))
    }

    #[instrument(skip(self))]
    async fn claim_created(&self, filter: ClaimFilter) -> Result<Vec<State>, StoreError> {
        let query = doc! {
            "status": to_bson(&StateStatus::Created)?,
            "namespace": &filter.namespace,
            "node_name": { "$in": filter.node_names.clone() },
            "enqueue_after": { "$lte": filter.now_ms },
        };
        let sort = doc! { "enqueue_after": 1, "created_at": 1 };
        let update = doc! {
            "$set": {
                "status": to_bson(&StateStatus::Queued)?,
                "queued_at": filter.now_ms,
            }
        };
        let options = FindOneAndUpdateOptions::builder()
            .sort(sort)
            .return_document(ReturnDocument::After)
            .build();

        let mut claimed = Vec::new();
        for _ in 0..filter.batch_size {
            let claimed_state = self
                .collection
                .find_one_and_update(query.clone(), update.clone())
                .with_options(options.clone())
                .await?;
            match claimed_state {
                Some(state) => claimed.push(state),
                None => break,
            }
        }
        debug!(count = claimed.len(), "claimed states");
        Ok(claimed)
    }

    #[instrument(skip(self, apply))]
    async fn transition(
        &self,
        id: &StateId,
        expected: StateStatus,
        apply: StateUpdate,
    ) -> Result<State, StoreError> {
        let mut set_doc = doc! {};
        if let Some(status) = apply.status {
            set_doc.insert("status", to_bson(&status)?);
        }
        if let Some(outputs) = apply.outputs {
            set_doc.insert("outputs", to_bson(&outputs)?);
        }
        if let Some(error) = apply.error {
            set_doc.insert("error", to_bson(&error)?);
        }
        if let Some(queued_at) = apply.queued_at {
            set_doc.insert("queued_at", to_bson(&queued_at)?);
        }
        if let Some(retry_count) = apply.retry_count {
            set_doc.insert("retry_count", retry_count);
        }
        set_doc.insert("updated_at", to_bson(&chrono::Utc::now())?);

        let query = doc! { "id": id.as_str(), "status": to_bson(&expected)? };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let updated = self
            .collection
            .find_one_and_update(query, doc! { "$set": set_doc })
            .with_options(options)
            .await?;

        match updated {
            Some(state) => Ok(state),
            None => {
                // Distinguish "doesn't exist" from "lost the CAS race".
                if self.collection.find_one(doc! { "id": id.as_str() }).await?.is_some() {
                    Err(StoreError::ConcurrencyConflict(format!(
                        "state {id} expected status {expected:?}"
                    )))
                } else {
                    Err(StoreError::NotFound(format!("state {id}")))
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn list_by_run(&self, run_id: &RunId, identifier: Option<&str>) -> Result<Vec<State>, StoreError> {
        let mut query = doc! { "run_id": run_id.as_str() };
        if let Some(identifier) = identifier {
            query.insert("identifier", identifier);
        }
        let options = FindOptions::builder().sort(doc! { "created_at": 1 }).build();
        let cursor = self.collection.find(query).with_options(options).await?;
        Ok(cursor.try_collect().await?)
    }

    #[instrument(skip(self))]
    async fn count_unsettled_siblings(
        &self,
        namespace: &str,
        graph_name: &str,
        identifier: &str,
        ancestor_identifier: &str,
        ancestor_state_id: &StateId,
    ) -> Result<u64, StoreError> {
        let query = doc! {
            "namespace": namespace,
            "graph_name": graph_name,
            "identifier": identifier,
            "status": { "$ne": to_bson(&StateStatus::Success)? },
            format!("parents.{ancestor_identifier}"): ancestor_state_id.as_str(),
        };
        Ok(self.collection.count_documents(query).await?)
    }

    #[instrument(skip(self))]
    async fn queued_past_timeout(&self, now_ms: i64) -> Result<Vec<State>, StoreError> {
        // `timeout_minutes` may be null (falls back to the global default at
        // the call site), so the threshold is computed per-document in Rust
        // rather than pushed into the query.
        let query = doc! {
            "status": to_bson(&StateStatus::Queued)?,
            "queued_at": { "$ne": mongodb::bson::Bson::Null },
        };
        let states: Vec<State> = self.collection.find(query).await?.try_collect().await?;
        Ok(states
            .into_iter()
            .filter(|state| {
                let timeout_minutes = state.timeout_minutes.unwrap_or(30) as i64;
                let Some(queued_at) = state.queued_at else { return false };
                queued_at + timeout_minutes * 60_000 <= now_ms
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn executed_stale(&self, older_than_ms: i64) -> Result<Vec<State>, StoreError> {
        let query = doc! {
            "status": to_bson(&StateStatus::Executed)?,
            "updated_at": { "$lte": mongodb::bson::DateTime::from_millis(older_than_ms) },
        };
        Ok(self.collection.find(query).await?.try_collect().await?)
    }
}
