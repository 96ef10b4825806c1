use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::{Collection, Database};
use tracing::instrument;

use state_manager_core::model::RegisteredNode;

use super::collection_names;
use crate::error::StoreError;
use crate::store::RegisteredNodeStore;

#[derive(Clone)]
pub struct MongoRegisteredNodeStore {
    collection: Collection<RegisteredNode>,
}

impl MongoRegisteredNodeStore {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(collection_names::REGISTERED_NODES),
        }
    }
}

#[async_trait]
impl RegisteredNodeStore for MongoRegisteredNodeStore {
    #[instrument(skip(self, nodes))]
    async fn register(&self, nodes: Vec<RegisteredNode>) -> Result<Vec<RegisteredNode>, StoreError> {
        for node in &nodes {
            self.collection
                .find_one_and_replace(
                    doc! { "namespace": &node.namespace, "name": &node.name },
                    node,
                )
                .upsert(true)
                .await?;
        }
        Ok(nodes)
    }

    #[instrument(skip(self, keys))]
    async fn list_for_template(
        &self,
        keys: &[(String, String)],
    ) -> Result<Vec<RegisteredNode>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let or_clauses: Vec<mongodb::bson::Document> = keys
            .iter()
            .map(|(namespace, name)| doc! { "namespace": namespace, "name": name })
            .collect();
        let cursor = self.collection.find(doc! { "$or": or_clauses }).await?;
        use futures::TryStreamExt;
        Ok(cursor.try_collect().await?)
    }

    #[instrument(skip(self))]
    async fn get(&self, namespace: &str, name: &str) -> Result<RegisteredNode, StoreError> {
        self.collection
            .find_one(doc! { "namespace": namespace, "name": name })
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("registered node {namespace}/{name}")))
    }
}
