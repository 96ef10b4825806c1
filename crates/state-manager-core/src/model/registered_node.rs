use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declares that a runtime can execute nodes of a given `(namespace, name)`.
///
/// Uniquely identified by `(namespace, name)`. `inputs_schema`/`outputs_schema`
/// are opaque JSON-Schema documents: this crate never interprets their
/// contents beyond "is this input field declared, and is it string-typed"
/// (see `crate::validator`), leaving schema compilation/validation itself to
/// the `jsonschema` crate at the engine layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredNode {
    pub name: String,
    pub namespace: String,
    pub inputs_schema: Value,
    pub outputs_schema: Value,
    #[serde(default)]
    pub secrets: Vec<String>,
    /// Per-node timeout override; falls back to the global default when unset.
    #[serde(default)]
    pub timeout_minutes: Option<u32>,
}

impl RegisteredNode {
    pub fn key(&self) -> (String, String) {
        (self.namespace.clone(), self.name.clone())
    }

    /// String-typed top-level properties declared on `inputs_schema`, used by
    /// the validator to check that every node input is a string field.
    pub fn string_input_fields(&self) -> Vec<String> {
        string_properties(&self.inputs_schema)
    }

    pub fn string_output_fields(&self) -> Vec<String> {
        string_properties(&self.outputs_schema)
    }
}

fn string_properties(schema: &Value) -> Vec<String> {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };
    properties
        .iter()
        .filter(|(_, v)| v.get("type").and_then(Value::as_str) == Some("string"))
        .map(|(k, _)| k.clone())
        .collect()
}
