//! Configuration levels and per-level raw documents

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// A named configuration source with a fixed default priority
///
/// Higher priority wins by default: enterprise > user > team > project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLevel {
    Project,
    Team,
    User,
    Enterprise,
}

impl ConfigLevel {
    /// All levels in ascending priority order
    pub fn all() -> [ConfigLevel; 4] {
        [
            ConfigLevel::Project,
            ConfigLevel::Team,
            ConfigLevel::User,
            ConfigLevel::Enterprise,
        ]
    }

    /// Default numeric priority of the level
    pub fn priority(&self) -> i64 {
        match self {
            ConfigLevel::Enterprise => 100,
            ConfigLevel::User => 75,
            ConfigLevel::Team => 50,
            ConfigLevel::Project => 25,
        }
    }

    /// Lowercase level name
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigLevel::Enterprise => "enterprise",
            ConfigLevel::User => "user",
            ConfigLevel::Team => "team",
            ConfigLevel::Project => "project",
        }
    }

    /// Environment variable that overrides this level's directory
    pub fn env_var(&self) -> &'static str {
        match self {
            ConfigLevel::Enterprise => "STRATUM_ENTERPRISE_CONFIG_DIR",
            ConfigLevel::User => "STRATUM_USER_CONFIG_DIR",
            ConfigLevel::Team => "STRATUM_TEAM_CONFIG_DIR",
            ConfigLevel::Project => "STRATUM_PROJECT_CONFIG_DIR",
        }
    }
}

impl fmt::Display for ConfigLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "enterprise" => Ok(ConfigLevel::Enterprise),
            "user" => Ok(ConfigLevel::User),
            "team" => Ok(ConfigLevel::Team),
            "project" => Ok(ConfigLevel::Project),
            other => Err(ConfigError::InvalidLevel(other.to_string())),
        }
    }
}

/// Sort levels and join them into a stable key, e.g. `"project,user"`
pub fn level_key(levels: &[ConfigLevel]) -> String {
    let mut names: Vec<&str> = levels.iter().map(|l| l.as_str()).collect();
    names.sort_unstable();
    names.dedup();
    names.join(",")
}

/// One level's loaded document
///
/// The document is always a JSON object. `metadata.source` and
/// `metadata.priority` override the level defaults when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawConfig {
    pub level: ConfigLevel,
    /// Config name within the level (file stem)
    pub name: String,
    /// File the document was loaded from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub document: Value,
}

impl RawConfig {
    /// Create a raw config; non-object documents are wrapped as an empty object
    pub fn new(level: ConfigLevel, name: impl Into<String>, document: Value) -> Self {
        let document = match document {
            Value::Object(_) => document,
            _ => Value::Object(Map::new()),
        };
        Self {
            level,
            name: name.into(),
            path: None,
            document,
        }
    }

    /// Attach the file path the document came from
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    fn metadata(&self) -> Option<&Map<String, Value>> {
        self.document.get("metadata").and_then(Value::as_object)
    }

    /// Source name used in conflict records
    pub fn source(&self) -> String {
        self.metadata()
            .and_then(|m| m.get("source"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.level.to_string())
    }

    /// Effective priority; `metadata.priority` wins over the level default
    pub fn priority(&self) -> i64 {
        self.metadata()
            .and_then(|m| m.get("priority"))
            .and_then(|p| p.as_i64().or_else(|| p.as_f64().map(|f| f as i64)))
            .unwrap_or_else(|| self.level.priority())
    }

    /// Declared document version, if any
    pub fn version(&self) -> Option<String> {
        self.metadata()
            .and_then(|m| m.get("version"))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
    }

    /// Whether the level declares full-override (nuclear) semantics
    pub fn declares_override(&self) -> bool {
        self.metadata()
            .and_then(|m| m.get("override"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Sort raw configs ascending by effective priority, keeping input order on ties
pub fn sort_by_priority(configs: &mut [RawConfig]) {
    configs.sort_by_key(|c| c.priority());
}
