//! Error types for the collection bridge.

use crate::types::Version;
use thiserror::Error;

/// Main error type for bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Precondition violated: {0}")]
    PreconditionViolation(String),

    #[error("Collection was mutated while being enumerated (expected {expected:?}, found {found:?})")]
    MutatedDuringEnumeration { expected: Version, found: Version },

    #[error("Index {index} is out of bounds (count is {count})")]
    IndexOutOfBounds { index: usize, count: usize },

    #[error("Collection invalidated: {0}")]
    Invalidated(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Invalid key '{key}' for class '{class}'")]
    InvalidKey { class: String, key: String },

    #[error("Invalid key path: {0}")]
    InvalidKeyPath(String),

    #[error("Cannot sort on key path: {0}")]
    InvalidSortKeyPath(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BridgeError {
    /// Whether this error originates in the storage engine rather than
    /// in misuse of the bridge.
    pub fn is_engine_error(&self) -> bool {
        matches!(self, BridgeError::Invalidated(_) | BridgeError::Engine(_))
    }
}

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
