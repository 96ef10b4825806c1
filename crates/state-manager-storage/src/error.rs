//! Storage error taxonomy, grounded on
//! `everruns-durable::persistence::store::StoreError`.

use thiserror::Error;

use state_manager_core::ManagerError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    /// A compare-and-set (claim, transition) lost the race: the expected
    /// pre-state no longer matched when the update ran.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<mongodb::error::Error> for StoreError {
    fn from(e: mongodb::error::Error) -> Self {
        // Mongo reports duplicate-key violations as server error code 11000
        // ("E11000 duplicate key error"); the driver surfaces it only in the
        // error's rendered message, not as a distinct variant we can match on
        // across driver versions, so we sniff the message like the rest of
        // the ecosystem does.
        let msg = e.to_string();
        if msg.contains("E11000") || msg.contains("duplicate key") {
            StoreError::DuplicateKey(msg)
        } else {
            StoreError::Database(msg)
        }
    }
}

impl From<bson::ser::Error> for StoreError {
    fn from(e: bson::ser::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<bson::de::Error> for StoreError {
    fn from(e: bson::de::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<StoreError> for ManagerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(m) => ManagerError::NotFound(m),
            StoreError::ConcurrencyConflict(m) => ManagerError::Conflict(m),
            StoreError::DuplicateKey(m) => ManagerError::Conflict(m),
            StoreError::Database(m) => ManagerError::Internal(m),
            StoreError::Serialization(m) => ManagerError::Internal(m),
        }
    }
}
