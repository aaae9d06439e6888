//! Structural validation of configuration documents

use std::sync::Arc;

use jsonschema::JSONSchema;
use serde_json::{json, Value};

use crate::error::{ConfigError, ConfigResult};

/// Schema every document must satisfy unless a custom one is supplied
pub fn default_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "metadata": {
                "type": "object",
                "properties": {
                    "source": { "type": "string" },
                    "priority": { "type": "number" },
                    "version": { "type": ["string", "number"] },
                    "override": { "type": "boolean" }
                }
            },
            "settings": { "type": "object" },
            "tools": { "type": "object" },
            "agents": { "type": ["object", "array"] }
        }
    })
}

/// Compiled JSON schema validator
#[derive(Clone)]
pub struct SchemaValidator {
    schema: Arc<JSONSchema>,
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator").finish_non_exhaustive()
    }
}

impl SchemaValidator {
    /// Compile a validator from a schema document
    pub fn new(schema: &Value) -> ConfigResult<Self> {
        let compiled = JSONSchema::compile(schema)
            .map_err(|e| ConfigError::internal(format!("Failed to compile schema: {}", e)))?;
        Ok(Self {
            schema: Arc::new(compiled),
        })
    }

    /// Validator for [`default_schema`]
    pub fn with_default_schema() -> ConfigResult<Self> {
        Self::new(&default_schema())
    }

    /// Validate a document, collecting every error as `path: message`
    pub fn validate(&self, document: &Value) -> Result<(), Vec<String>> {
        match self.schema.validate(document) {
            Ok(()) => Ok(()),
            Err(errors) => Err(errors
                .map(|e| {
                    let location = e.instance_path.to_string();
                    if location.is_empty() {
                        e.to_string()
                    } else {
                        format!("{}: {}", location, e)
                    }
                })
                .collect()),
        }
    }

    pub fn is_valid(&self, document: &Value) -> bool {
        self.schema.is_valid(document)
    }
}
