//! Error types for the spellbook store
//!
//! All errors use thiserror for structured error handling.
//! These errors can be serialized for display by a UI layer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid setting key: {0}")]
    InvalidKey(String),

    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    #[error("Forbidden operation: {0}")]
    ForbiddenOperation(String),

    #[error("Invalid spellbook name: {0}")]
    InvalidSpellbookName(String),

    #[error("Invalid import data: {0}")]
    InvalidImport(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// True for failures raised by the storage engine rather than by validation.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            StoreError::Database(_) | StoreError::Io(_) | StoreError::Serialization(_)
        )
    }
}

impl serde::Serialize for StoreError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
