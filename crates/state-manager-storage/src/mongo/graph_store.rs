use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::{Collection, Database};
use tracing::instrument;

use state_manager_core::model::{GraphTemplate, GraphValidationStatus, Trigger};

use super::collection_names;
use crate::error::StoreError;
use crate::store::GraphTemplateStore;

#[derive(Clone)]
pub struct MongoGraphTemplateStore {
    collection: Collection<GraphTemplate>,
}

impl MongoGraphTemplateStore {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(collection_names::GRAPH_TEMPLATES),
        }
    }
}

#[async_trait]
impl GraphTemplateStore for MongoGraphTemplateStore {
    #[instrument(skip(self))]
    async fn get(&self, namespace: &str, name: &str) -> Result<GraphTemplate, StoreError> {
        self.collection
            .find_one(doc! { "namespace": namespace, "name": name })
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("graph {namespace}/{name}")))
    }

    #[instrument(skip(self, template))]
    async fn upsert(
        &self,
        mut template: GraphTemplate,
    ) -> Result<(GraphTemplate, Vec<Trigger>), StoreError> {
        let previous = self.collection.find_one(doc! {
            "namespace": &template.namespace,
            "name": &template.name,
        }).await?;
        let previous_triggers = previous.map(|t| t.triggers).unwrap_or_default();

        template.validation_status = GraphValidationStatus::Pending;
        template.validation_errors.clear();

        self.collection
            .find_one_and_replace(
                doc! { "namespace": &template.namespace, "name": &template.name },
                &template,
            )
            .upsert(true)
            .await?;

        Ok((template, previous_triggers))
    }

    #[instrument(skip(self, errors))]
    async fn set_validation_result(
        &self,
        namespace: &str,
        name: &str,
        status: GraphValidationStatus,
        errors: Vec<String>,
    ) -> Result<(), StoreError> {
        let update = doc! {
            "$set": {
                "validation_status": mongodb::bson::to_bson(&status)?,
                "validation_errors": errors,
            }
        };
        let result = self
            .collection
            .update_one(doc! { "namespace": namespace, "name": name }, update)
            .await?;
        if result.matched_count == 0 {
            return Err(StoreError::NotFound(format!("graph {namespace}/{name}")));
        }
        Ok(())
    }
}
