//! Process-wide configuration, read once at startup (spec.md §6).
//!
//! Grounded on the teacher's `dotenvy`-then-env-vars pattern and
//! `original_source/state-manager/app/config/settings.py`'s `Settings.from_env`.

use serde::Deserialize;

fn default_mongo_database_name() -> String {
    "exosphere-state-manager".to_string()
}

fn default_trigger_workers() -> u32 {
    1
}

fn default_trigger_retention_days() -> u32 {
    30
}

fn default_run_ttl_days() -> u32 {
    30
}

fn default_node_timeout_minutes() -> u32 {
    30
}

fn default_trigger_ahead_time() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub mongo_uri: String,
    #[serde(default = "default_mongo_database_name")]
    pub mongo_database_name: String,
    pub state_manager_secret: String,
    /// URL-safe base64 of 32 bytes for AES-GCM-256.
    pub secrets_encryption_key: String,
    #[serde(default = "default_trigger_workers")]
    pub trigger_workers: u32,
    #[serde(default = "default_trigger_retention_days")]
    pub trigger_retention_days: u32,
    #[serde(default = "default_run_ttl_days")]
    pub run_ttl_days: u32,
    #[serde(default = "default_node_timeout_minutes")]
    pub node_timeout_minutes: u32,
    /// Minutes ahead of `now()` the trigger scheduler searches for due crons
    /// on startup catch-up (SPEC_FULL §3 addition).
    #[serde(default = "default_trigger_ahead_time")]
    pub trigger_ahead_time: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to load configuration from environment: {0}")]
    Env(#[from] envy::Error),
}

impl Settings {
    /// Load `.env` (if present, never overriding already-set vars) then parse
    /// the process environment into a typed `Settings`.
    pub fn from_env() -> Result<Self, SettingsError> {
        let _ = dotenvy::dotenv();
        envy::from_env::<Settings>().map_err(SettingsError::from)
    }
}
