//! Custom post-merge rules scoped by glob patterns over dot-paths

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::level::RawConfig;
use crate::path::{flatten_paths, get_path, set_path, PathPattern};
use crate::resolve::union_lists;

/// Separator used by `string_concat` when none is configured
pub const DEFAULT_SEPARATOR: &str = ",";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeRuleType {
    /// Drop duplicate list entries, keeping first occurrences
    ArrayUnique,
    /// Join a list of strings with `rule_config.separator`
    StringConcat,
    /// Force the value from the source named by `rule_config.source`
    PriorityOverride,
}

impl fmt::Display for MergeRuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MergeRuleType::ArrayUnique => "array_unique",
            MergeRuleType::StringConcat => "string_concat",
            MergeRuleType::PriorityOverride => "priority_override",
        };
        f.write_str(name)
    }
}

impl FromStr for MergeRuleType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "array_unique" => Ok(MergeRuleType::ArrayUnique),
            "string_concat" => Ok(MergeRuleType::StringConcat),
            "priority_override" => Ok(MergeRuleType::PriorityOverride),
            other => Err(ConfigError::invalid_rule(other, "unknown rule type")),
        }
    }
}

/// A pattern-scoped transformation applied after the structural merge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRule {
    pub path_pattern: String,
    pub rule_type: MergeRuleType,
    #[serde(default)]
    pub rule_config: Value,
}

impl MergeRule {
    /// Validate and build a rule
    pub fn new(
        path_pattern: impl Into<String>,
        rule_type: MergeRuleType,
        rule_config: Value,
    ) -> ConfigResult<Self> {
        let path_pattern = path_pattern.into();
        PathPattern::new(&path_pattern)?;
        if rule_type == MergeRuleType::PriorityOverride
            && rule_config.get("source").and_then(Value::as_str).is_none()
        {
            return Err(ConfigError::invalid_rule(
                path_pattern,
                "priority_override requires a 'source' in rule_config",
            ));
        }
        Ok(Self {
            path_pattern,
            rule_type,
            rule_config,
        })
    }

    pub fn array_unique(pattern: &str) -> ConfigResult<Self> {
        Self::new(pattern, MergeRuleType::ArrayUnique, Value::Null)
    }

    pub fn string_concat(pattern: &str, separator: &str) -> ConfigResult<Self> {
        Self::new(
            pattern,
            MergeRuleType::StringConcat,
            json!({ "separator": separator }),
        )
    }

    pub fn priority_override(pattern: &str, source: &str) -> ConfigResult<Self> {
        Self::new(
            pattern,
            MergeRuleType::PriorityOverride,
            json!({ "source": source }),
        )
    }

    fn separator(&self) -> &str {
        self.rule_config
            .get("separator")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_SEPARATOR)
    }

    fn source(&self) -> Option<&str> {
        self.rule_config.get("source").and_then(Value::as_str)
    }
}

/// Ordered set of custom rules
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    rules: Vec<MergeRule>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule(&mut self, rule: MergeRule) {
        self.rules.push(rule);
    }

    /// Remove every rule with this pattern, returning how many were removed
    pub fn remove_rule(&mut self, pattern: &str) -> usize {
        let before = self.rules.len();
        self.rules.retain(|r| r.path_pattern != pattern);
        before - self.rules.len()
    }

    pub fn rules(&self) -> &[MergeRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply all rules in order, returning the number of paths changed
    ///
    /// A path a rule cannot write, e.g. because the merged tree holds a
    /// scalar where the rule needs a map, is logged and skipped.
    pub fn apply(&self, merged: &mut Value, originals: &[RawConfig]) -> ConfigResult<usize> {
        let mut changed = 0;
        for rule in &self.rules {
            let pattern = PathPattern::new(&rule.path_pattern)?;
            changed += match rule.rule_type {
                MergeRuleType::ArrayUnique => apply_array_unique(merged, &pattern)?,
                MergeRuleType::StringConcat => {
                    apply_string_concat(merged, &pattern, rule.separator())?
                }
                MergeRuleType::PriorityOverride => {
                    let source = rule.source().ok_or_else(|| {
                        ConfigError::invalid_rule(&rule.path_pattern, "missing 'source'")
                    })?;
                    apply_priority_override(merged, &pattern, source, originals)?
                }
            };
        }
        Ok(changed)
    }
}

fn write_or_skip(
    merged: &mut Value,
    path: &str,
    value: Value,
    create_missing: bool,
    rule: MergeRuleType,
) -> bool {
    match set_path(merged, path, value, create_missing) {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %path, rule = %rule, error = %e, "Merge rule could not write path, skipping");
            false
        }
    }
}

fn matching_paths(doc: &Value, pattern: &PathPattern) -> Vec<String> {
    flatten_paths(doc)
        .into_iter()
        .filter(|p| pattern.matches(p))
        .collect()
}

fn apply_array_unique(merged: &mut Value, pattern: &PathPattern) -> ConfigResult<usize> {
    let mut changed = 0;
    for path in matching_paths(merged, pattern) {
        let Some(Value::Array(items)) = get_path(merged, &path) else {
            continue;
        };
        let unique = union_lists(items, &[]);
        if unique.len() != items.len() {
            if write_or_skip(merged, &path, Value::Array(unique), false, MergeRuleType::ArrayUnique) {
                changed += 1;
            }
        }
    }
    Ok(changed)
}

fn apply_string_concat(
    merged: &mut Value,
    pattern: &PathPattern,
    separator: &str,
) -> ConfigResult<usize> {
    let mut changed = 0;
    for path in matching_paths(merged, pattern) {
        let Some(Value::Array(items)) = get_path(merged, &path) else {
            continue;
        };
        let parts: Option<Vec<&str>> = items.iter().map(Value::as_str).collect();
        match parts {
            Some(parts) => {
                let joined = parts.join(separator);
                let joined = Value::String(joined);
                if write_or_skip(merged, &path, joined, false, MergeRuleType::StringConcat) {
                    changed += 1;
                }
            }
            None => debug!(path = %path, "string_concat skipped, list holds non-strings"),
        }
    }
    Ok(changed)
}

fn apply_priority_override(
    merged: &mut Value,
    pattern: &PathPattern,
    source: &str,
    originals: &[RawConfig],
) -> ConfigResult<usize> {
    let mut changed = 0;
    for raw in originals
        .iter()
        .filter(|r| r.source() == source || r.level.as_str() == source)
    {
        for path in matching_paths(&raw.document, pattern) {
            let Some(value) = get_path(&raw.document, &path) else {
                continue;
            };
            if write_or_skip(merged, &path, value.clone(), true, MergeRuleType::PriorityOverride) {
                changed += 1;
            }
        }
    }
    if changed == 0 {
        debug!(source = %source, pattern = %pattern.as_str(), "priority_override matched nothing");
    }
    Ok(changed)
}
