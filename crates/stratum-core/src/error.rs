//! Error types for merging and conflict resolution

use thiserror::Error;

/// Result type for merge and resolution operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised by the merge engine, rule engine and resolvers
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A conflict was found while the ABORT policy was active
    #[error("Merge aborted on conflict at '{path}' between {source1} and {source2}")]
    MergeAborted {
        path: String,
        source1: String,
        source2: String,
    },

    /// A dot-path could not be traversed or written
    #[error("Invalid path '{path}': {message}")]
    InvalidPath { path: String, message: String },

    /// A custom merge rule is malformed
    #[error("Invalid merge rule for '{pattern}': {message}")]
    InvalidRule { pattern: String, message: String },

    /// Unknown configuration level name
    #[error("Unknown configuration level: {0}")]
    InvalidLevel(String),

    /// Value could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resolver IO failure (prompt loop)
    #[error("Resolver IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConfigError {
    /// Create an invalid path error
    pub fn invalid_path(path: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidPath {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid rule error
    pub fn invalid_rule(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidRule {
            pattern: pattern.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        ConfigError::Internal(message.into())
    }
}
