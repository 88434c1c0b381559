//! Error types for Tendril Core

use thiserror::Error;

/// Result type alias using Tendril's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Tendril error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error on {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Inflate error on {field}: {message}")]
    Inflate { field: String, message: String },

    #[error("Unique constraint violation on {field}: {message}")]
    UniqueConstraintViolation { field: String, message: String },

    #[error("Store constraint violation on {constraint}: {message}")]
    StoreConstraintViolation { constraint: String, message: String },

    #[error("Instance not saved: {0}")]
    InstanceNotSaved(String),

    #[error("Instance was deleted and cannot be saved again: {0}")]
    InstanceDeleted(String),

    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Multiple results found: {0}")]
    MultipleResultsFound(String),

    #[error("Attempted cardinality violation on {relationship}: {message}")]
    AttemptedCardinalityViolation {
        relationship: String,
        message: String,
    },

    #[error("Cardinality violation on {relationship}: {message}")]
    CardinalityViolation {
        relationship: String,
        message: String,
    },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn inflate(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Inflate {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether this error came from the store connection rather than from the caller
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}
