//! Account store error types.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AccountStoreError {
    #[error("Account '{0}' already exists")]
    AlreadyExists(String),

    #[error("Unknown account field '{0}'")]
    UnknownField(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Account store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for AccountStoreError {
    fn from(e: rusqlite::Error) -> Self {
        AccountStoreError::Database(e.to_string())
    }
}
