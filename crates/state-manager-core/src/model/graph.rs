use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Reserved namespace for the universal/built-in node library.
pub const BUILTIN_NAMESPACE: &str = "exospherehost";

/// A join declaration: the node waits for every descendant of `identifier`
/// (the ancestor state instance) to reach `SUCCESS` before it runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Unites {
    pub identifier: String,
}

/// One node in a graph template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTemplate {
    pub node_name: String,
    pub namespace: String,
    pub identifier: String,
    /// input name -> placeholder string (parsed lazily by the validator/fanout engine)
    #[serde(default)]
    pub inputs: HashMap<String, String>,
    #[serde(default)]
    pub next_nodes: Vec<String>,
    #[serde(default)]
    pub unites: Option<Unites>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum BackoffMethod {
    Fixed,
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub method: BackoffMethod,
    /// `f` in the backoff law (spec.md §4.4/§8): seconds, or base, depending on `method`.
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            method: BackoffMethod::Fixed,
            backoff_factor: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub required_keys: Vec<String>,
    #[serde(default)]
    pub default_values: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum TriggerType {
    Cron,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Trigger {
    #[serde(rename = "type")]
    pub kind: TriggerType,
    pub expression: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum GraphValidationStatus {
    Pending,
    Ongoing,
    Valid,
    Invalid,
}

/// Uniquely identified by `(namespace, name)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphTemplate {
    pub namespace: String,
    pub name: String,
    pub nodes: Vec<NodeTemplate>,
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    #[serde(default)]
    pub store_config: StoreConfig,
    /// name -> AEAD ciphertext (base64, `SecretsCipher::encrypt` output).
    /// Never serialized back out over the API: the HTTP layer projects this
    /// into a `{name: true}` presence map before responding.
    #[serde(default)]
    pub secrets: HashMap<String, String>,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    pub validation_status: GraphValidationStatus,
    #[serde(default)]
    pub validation_errors: Vec<String>,
}

impl GraphTemplate {
    pub fn key(&self) -> (String, String) {
        (self.namespace.clone(), self.name.clone())
    }

    pub fn node_by_identifier(&self, identifier: &str) -> Option<&NodeTemplate> {
        self.nodes.iter().find(|n| n.identifier == identifier)
    }
}
