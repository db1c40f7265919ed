//! Error types for the Stride engine.

use thiserror::Error;

/// All possible errors from the Stride engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Schema errors
    #[error("unknown store: {0}")]
    UnknownStore(String),

    #[error("unknown index '{index}' on store {store}")]
    UnknownIndex { store: String, index: String },

    #[error("invalid index definition '{0}'")]
    InvalidIndex(String),

    // Record errors
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("index '{index}' expects {expected} value(s), got {got}")]
    InvalidIndexValue {
        index: String,
        expected: usize,
        got: usize,
    },

    // Queue errors
    #[error("unknown operation kind: {0}")]
    UnknownOperationKind(String),

    // Configuration errors
    #[error("invalid sync options: {0}")]
    InvalidOptions(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
