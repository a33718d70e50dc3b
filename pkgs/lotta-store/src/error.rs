//! Error types for store operations

use thiserror::Error;

use crate::key::StoreKey;

/// Errors that can occur while reading or writing a normalized store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Entry {key} does not have the expected shape: {reason}")]
    TypeMismatch { key: StoreKey, reason: String },
    #[error("Update rejected: {0}")]
    Rejected(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Snapshot holds {entries} entries, limit is {max}")]
    CapacityExceeded { entries: usize, max: usize },
}

impl StoreError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }
}

impl From<sea_orm::DbErr> for StoreError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}
