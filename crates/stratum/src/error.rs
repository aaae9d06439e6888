//! Error types for the hierarchy orchestrator

use stratum_core::{ConfigError, ConfigLevel};
use stratum_storage::StorageError;
use thiserror::Error;

/// Result type for orchestrator operations
pub type HierarchyResult<T> = Result<T, HierarchyError>;

#[derive(Error, Debug)]
pub enum HierarchyError {
    /// Write to a level that has no document, without `create_missing`
    #[error("No configuration exists at the {0} level")]
    LevelNotFound(ConfigLevel),

    /// Write through a path whose parents do not exist, without `create_missing`
    #[error("Path '{path}' not found: {message}")]
    PathNotFound { path: String, message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Settings file or environment value is invalid
    #[error("Invalid setting {name}: {message}")]
    InvalidSetting { name: String, message: String },
}

impl HierarchyError {
    pub fn invalid_setting(name: impl Into<String>, message: impl Into<String>) -> Self {
        HierarchyError::InvalidSetting {
            name: name.into(),
            message: message.into(),
        }
    }
}
