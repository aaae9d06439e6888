//! Configuration document loader supporting multiple formats
//!
//! Documents are parsed into a `serde_json::Value` tree regardless of the
//! on-disk format, which is detected from the file extension.

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{IoOperation, StorageError, StorageResult};
use crate::types::ConfigFormat;

/// Loads and saves configuration documents
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a document from a file, detecting the format from its extension
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> StorageResult<Value> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path).ok_or_else(|| {
            StorageError::parse_error(
                path.to_path_buf(),
                "unknown",
                format!("Unsupported file format: {}", path.display()),
            )
        })?;

        let content = std::fs::read_to_string(path)
            .map_err(|e| StorageError::io_error(path.to_path_buf(), IoOperation::Read, e))?;

        Self::load_from_string(&content, format, path)
    }

    /// Parse a document from a string with the given format
    ///
    /// Blank content parses as an empty map.
    pub fn load_from_string<P: AsRef<Path>>(
        content: &str,
        format: ConfigFormat,
        path: P,
    ) -> StorageResult<Value> {
        let path = path.as_ref();
        if content.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        let parsed = match format {
            ConfigFormat::Json => serde_json::from_str::<Value>(content).map_err(|e| e.to_string()),
            ConfigFormat::Yaml => serde_yaml::from_str::<Value>(content).map_err(|e| e.to_string()),
            ConfigFormat::Toml => toml::from_str::<Value>(content).map_err(|e| e.to_string()),
        };
        parsed.map_err(|message| StorageError::parse_error(path.to_path_buf(), format.name(), message))
    }

    /// Serialize a document in the given format
    pub fn serialize(document: &Value, format: ConfigFormat) -> StorageResult<String> {
        match format {
            ConfigFormat::Json => serde_json::to_string_pretty(document).map_err(|e| {
                StorageError::internal(format!("Failed to serialize to JSON: {}", e))
            }),
            ConfigFormat::Yaml => serde_yaml::to_string(document).map_err(|e| {
                StorageError::internal(format!("Failed to serialize to YAML: {}", e))
            }),
            ConfigFormat::Toml => toml::to_string_pretty(document).map_err(|e| {
                StorageError::internal(format!("Failed to serialize to TOML: {}", e))
            }),
        }
    }

    /// Save a document to a file in the given format
    pub fn save_to_file<P: AsRef<Path>>(
        document: &Value,
        path: P,
        format: ConfigFormat,
    ) -> StorageResult<()> {
        let path = path.as_ref();
        let content = Self::serialize(document, format)?;
        std::fs::write(path, content)
            .map_err(|e| StorageError::io_error(path.to_path_buf(), IoOperation::Write, e))
    }
}
