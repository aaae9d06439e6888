//! Rules-table resolver for non-interactive runs

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use super::{ConflictResolver, ResolutionChoice, ResolutionSession};
use crate::conflict::Conflict;
use crate::error::{ConfigError, ConfigResult};
use crate::path::glob_matches;

/// Resolves conflicts from a table of exact paths or glob patterns
///
/// Exact path entries win over patterns; patterns are tried in insertion
/// order. Unmatched conflicts take the higher-priority value.
#[derive(Debug, Clone, Default)]
pub struct BatchResolver {
    rules: Vec<(String, ResolutionChoice)>,
}

impl BatchResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, pattern: impl Into<String>, choice: ResolutionChoice) -> Self {
        self.add_rule(pattern, choice);
        self
    }

    pub fn add_rule(&mut self, pattern: impl Into<String>, choice: ResolutionChoice) {
        self.rules.push((pattern.into(), choice));
    }

    /// Build from a `{pattern: action}` map
    pub fn from_map(rules: &BTreeMap<String, Value>) -> Self {
        let mut resolver = Self::new();
        for (pattern, action) in rules {
            resolver.add_rule(pattern.clone(), ResolutionChoice::from_rule_value(action));
        }
        resolver
    }

    /// Load a `{pattern: action}` table from a JSON or YAML file
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let rules: BTreeMap<String, Value> = if is_yaml {
            serde_yaml::from_str(&content)
                .map_err(|e| ConfigError::invalid_rule(path.display().to_string(), e.to_string()))?
        } else {
            serde_json::from_str(&content)?
        };
        Ok(Self::from_map(&rules))
    }

    /// Choice for a path: exact entry first, then the first matching pattern
    pub fn choice_for(&self, path: &str) -> ResolutionChoice {
        self.rules
            .iter()
            .find(|(pattern, _)| pattern == path)
            .or_else(|| {
                self.rules
                    .iter()
                    .find(|(pattern, _)| glob_matches(pattern, path))
            })
            .map(|(_, choice)| choice.clone())
            .unwrap_or(ResolutionChoice::HigherPriority)
    }
}

impl ConflictResolver for BatchResolver {
    fn resolve(&self, conflicts: &[Conflict]) -> ConfigResult<ResolutionSession> {
        let mut session = ResolutionSession::new(conflicts.to_vec());
        for conflict in conflicts {
            let choice = self.choice_for(&conflict.path);
            debug!(path = %conflict.path, choice = ?choice, "Batch rule applied");
            session.resolve(conflict, &choice);
        }
        Ok(session)
    }
}
