use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use state_manager_core::model::{GraphTemplate, GraphValidationStatus, Trigger};

use crate::error::StoreError;
use crate::store::GraphTemplateStore;

#[derive(Default)]
pub struct InMemoryGraphTemplateStore {
    templates: RwLock<HashMap<(String, String), (GraphTemplate, Vec<Trigger>)>>,
}

impl InMemoryGraphTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphTemplateStore for InMemoryGraphTemplateStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<GraphTemplate, StoreError> {
        self.templates
            .read()
            .get(&(namespace.to_string(), name.to_string()))
            .map(|(t, _)| t.clone())
            .ok_or_else(|| StoreError::NotFound(format!("graph {namespace}/{name}")))
    }

    async fn upsert(
        &self,
        mut template: GraphTemplate,
    ) -> Result<(GraphTemplate, Vec<Trigger>), StoreError> {
        let key = template.key();
        let mut guard = self.templates.write();
        let previous_triggers = guard.get(&key).map(|(_, triggers)| triggers.clone()).unwrap_or_default();

        template.validation_status = GraphValidationStatus::Pending;
        template.validation_errors.clear();

        let new_triggers = template.triggers.clone();
        guard.insert(key, (template.clone(), new_triggers));
        Ok((template, previous_triggers))
    }

    async fn set_validation_result(
        &self,
        namespace: &str,
        name: &str,
        status: GraphValidationStatus,
        errors: Vec<String>,
    ) -> Result<(), StoreError> {
        let mut guard = self.templates.write();
        let entry = guard
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| StoreError::NotFound(format!("graph {namespace}/{name}")))?;
        entry.0.validation_status = status;
        entry.0.validation_errors = errors;
        Ok(())
    }
}
