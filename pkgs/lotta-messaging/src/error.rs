//! Error types for messaging cache operations

use lotta_store::StoreError;
use thiserror::Error;

use crate::models::{ConversationId, MessageDestination};

/// Failure reported by the messaging API
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct ApiError {
    pub message: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors that can occur while updating cached messaging views
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("A message to {0} is already being sent")]
    SendInFlight(MessageDestination),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Message belongs to conversation {found}, expected {expected}")]
    ConversationMismatch {
        expected: ConversationId,
        found: ConversationId,
    },
}
