use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use state_manager_core::model::RegisteredNode;

use crate::error::StoreError;
use crate::store::RegisteredNodeStore;

#[derive(Default)]
pub struct InMemoryRegisteredNodeStore {
    nodes: RwLock<HashMap<(String, String), RegisteredNode>>,
}

impl InMemoryRegisteredNodeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegisteredNodeStore for InMemoryRegisteredNodeStore {
    async fn register(&self, nodes: Vec<RegisteredNode>) -> Result<Vec<RegisteredNode>, StoreError> {
        let mut guard = self.nodes.write();
        for node in &nodes {
            guard.insert(node.key(), node.clone());
        }
        Ok(nodes)
    }

    async fn list_for_template(
        &self,
        keys: &[(String, String)],
    ) -> Result<Vec<RegisteredNode>, StoreError> {
        let guard = self.nodes.read();
        Ok(keys.iter().filter_map(|k| guard.get(k).cloned()).collect())
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<RegisteredNode, StoreError> {
        self.nodes
            .read()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("registered node {namespace}/{name}")))
    }
}
