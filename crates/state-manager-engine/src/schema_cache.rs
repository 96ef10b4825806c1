//! Compiled-schema cache (SPEC_FULL §3 addition): the validator crate treats
//! `inputs_schema`/`outputs_schema` as opaque JSON; this module is where the
//! engine actually compiles them with `jsonschema` and memoizes the result
//! per `(namespace, name)`, following the Design Note's "compile once per
//! RegisteredNode and cache" guidance.
//!
//! A `std::sync::RwLock<HashMap<_>>` is enough here: compilation is cheap
//! relative to a network round-trip and contention is read-mostly, so there
//! is no need for a sharded map.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use jsonschema::Validator;
use serde_json::Value;

#[derive(Default)]
pub struct SchemaCache {
    validators: RwLock<HashMap<(String, String), Arc<Validator>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the cached compiled validator for `(namespace, name)`'s inputs
    /// schema, compiling and inserting it on first use.
    pub fn inputs_validator(
        &self,
        namespace: &str,
        name: &str,
        schema: &Value,
    ) -> Result<Arc<Validator>, jsonschema::ValidationError<'static>> {
        self.validator_for(namespace, name, "inputs", schema)
    }

    pub fn outputs_validator(
        &self,
        namespace: &str,
        name: &str,
        schema: &Value,
    ) -> Result<Arc<Validator>, jsonschema::ValidationError<'static>> {
        self.validator_for(namespace, name, "outputs", schema)
    }

    fn validator_for(
        &self,
        namespace: &str,
        name: &str,
        kind: &str,
        schema: &Value,
    ) -> Result<Arc<Validator>, jsonschema::ValidationError<'static>> {
        let key = (namespace.to_string(), format!("{name}:{kind}"));
        if let Some(v) = self.validators.read().unwrap().get(&key) {
            return Ok(v.clone());
        }

        let compiled = Arc::new(jsonschema::validator_for(schema)?);
        self.validators.write().unwrap().insert(key, compiled.clone());
        Ok(compiled)
    }

    /// Drop a node's cached validators, e.g. after `POST /nodes/` re-registers
    /// it with a new schema.
    pub fn invalidate(&self, namespace: &str, name: &str) {
        let mut guard = self.validators.write().unwrap();
        guard.remove(&(namespace.to_string(), format!("{name}:inputs")));
        guard.remove(&(namespace.to_string(), format!("{name}:outputs")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compiles_once_and_reuses() {
        let cache = SchemaCache::new();
        let schema = json!({"type": "object", "properties": {"x": {"type": "string"}}});
        let v1 = cache.inputs_validator("ns", "node", &schema).unwrap();
        let v2 = cache.inputs_validator("ns", "node", &schema).unwrap();
        assert!(Arc::ptr_eq(&v1, &v2));
    }

    #[test]
    fn invalidate_forces_recompile() {
        let cache = SchemaCache::new();
        let schema = json!({"type": "object"});
        let v1 = cache.inputs_validator("ns", "node", &schema).unwrap();
        cache.invalidate("ns", "node");
        let v2 = cache.inputs_validator("ns", "node", &schema).unwrap();
        assert!(!Arc::ptr_eq(&v1, &v2));
    }
}
