//! Error types for the merge engine.

use serde_json::Value;
use thiserror::Error;

/// Boxed error returned by caller-supplied fold functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while merging records.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Targets, sources, keys or operations have the wrong shape.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An operation mapping names a token that is not in the catalog.
    #[error("unsupported operation '{operation}' for field '{field}'")]
    UnsupportedOperation { field: String, operation: String },

    /// A key field value could not be canonically encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A built-in operation received a value it cannot aggregate.
    #[error("operation '{operation}' cannot aggregate field '{field}' with value {value}")]
    InvalidOperand {
        operation: String,
        field: String,
        value: Value,
    },

    /// A built-in operation produced a number JSON cannot represent.
    #[error("operation '{operation}' overflowed on field '{field}'")]
    Overflow { operation: String, field: String },

    /// A caller-supplied fold function failed.
    #[error(transparent)]
    Fold(BoxError),

    /// The merge configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

impl MergeError {
    /// Create an invalid-argument error from any message.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create an unsupported-operation error for a field.
    pub fn unsupported(field: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            field: field.into(),
            operation: operation.into(),
        }
    }
}

impl From<serde_json::Error> for MergeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for MergeError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Convenience alias for merge results.
pub type MergeResult<T> = Result<T, MergeError>;
