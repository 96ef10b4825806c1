use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{doc, to_bson};
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};
use mongodb::{Collection, Database};
use tracing::instrument;

use state_manager_core::model::{DatabaseTrigger, TriggerId, TriggerStatus, TriggerType};

use super::{collection_names, new_id};
use crate::error::StoreError;
use crate::store::TriggerStore;

#[derive(Clone)]
pub struct MongoTriggerStore {
    collection: Collection<DatabaseTrigger>,
}

impl MongoTriggerStore {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(collection_names::TRIGGERS),
        }
    }
}

#[async_trait]
impl TriggerStore for MongoTriggerStore {
    /// Atomic `findAndModify` claiming one `PENDING` row, per spec.md §4.7
    /// step 1 and `original_source`'s `trigger_cron.py::get_due_triggers`.
    #[instrument(skip(self))]
    async fn claim_due(&self, cron_time: DateTime<Utc>) -> Result<Option<DatabaseTrigger>, StoreError> {
        let query = doc! {
            "trigger_time": { "$lte": cron_time },
            "trigger_status": to_bson(&TriggerStatus::Pending)?,
        };
        let update = doc! { "$set": { "trigger_status": to_bson(&TriggerStatus::Triggering)? } };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        Ok(self
            .collection
            .find_one_and_update(query, update)
            .with_options(options)
            .await?)
    }

    #[instrument(skip(self))]
    async fn set_status(
        &self,
        id: &str,
        status: TriggerStatus,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let update = doc! {
            "$set": {
                "trigger_status": to_bson(&status)?,
                "expires_at": to_bson(&expires_at)?,
            }
        };
        self.collection
            .update_one(doc! { "id": id }, update)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, trigger))]
    async fn insert_pending(&self, mut trigger: DatabaseTrigger) -> Result<(), StoreError> {
        if trigger.id.as_str().is_empty() {
            trigger.id = TriggerId::new(new_id());
        }
        self.collection.insert_one(&trigger).await?;
        Ok(())
    }

    /// Reconciliation diff on upsert (spec.md §4.8): cancel every `PENDING`
    /// row for a cron expression removed from the new trigger list.
    #[instrument(skip(self, expressions))]
    async fn cancel_pending(
        &self,
        graph_name: &str,
        namespace: &str,
        expressions: &[String],
        expires_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        if expressions.is_empty() {
            return Ok(0);
        }
        let query = doc! {
            "graph_name": graph_name,
            "namespace": namespace,
            "type": to_bson(&TriggerType::Cron)?,
            "trigger_status": to_bson(&TriggerStatus::Pending)?,
            "expression": { "$in": expressions },
        };
        let update = doc! {
            "$set": {
                "trigger_status": to_bson(&TriggerStatus::Cancelled)?,
                "expires_at": expires_at,
            }
        };
        let result = self.collection.update_many(query, update).await?;
        Ok(result.modified_count)
    }

    /// Startup reconciliation (spec.md §4.7 last paragraph): terminal rows
    /// that never got an `expires_at` (e.g. a crash between the status
    /// write and the TTL stamp) are cancelled with a fresh expiry.
    #[instrument(skip(self))]
    async fn reconcile_dangling(&self, expires_at: DateTime<Utc>) -> Result<u64, StoreError> {
        let query = doc! {
            "trigger_status": { "$in": [
                to_bson(&TriggerStatus::Triggered)?,
                to_bson(&TriggerStatus::Failed)?,
            ] },
            "expires_at": mongodb::bson::Bson::Null,
        };
        let update = doc! {
            "$set": {
                "trigger_status": to_bson(&TriggerStatus::Cancelled)?,
                "expires_at": expires_at,
            }
        };
        let result = self.collection.update_many(query, update).await?;
        Ok(result.modified_count)
    }
}
