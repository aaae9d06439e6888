//! Conflict resolvers and resolution sessions
//!
//! Resolvers are chosen independently of the merge call. The merge engine
//! hands them the conflicts it found under the INTERACTIVE policy and
//! applies whatever the returned [`ResolutionSession`] settled.

pub mod auto;
pub mod batch;
pub mod cli;

pub use auto::AutoResolver;
pub use batch::BatchResolver;
pub use cli::CliResolver;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::conflict::{Conflict, ConflictType};
use crate::error::ConfigResult;
use crate::path::glob_matches;

/// Picks values for a batch of conflicts
pub trait ConflictResolver: Send + Sync {
    fn resolve(&self, conflicts: &[Conflict]) -> ConfigResult<ResolutionSession>;
}

/// One resolution action for a conflict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionChoice {
    Source1,
    Source2,
    HigherPriority,
    Merge,
    Custom(Value),
}

impl ResolutionChoice {
    /// Parse a rule action: `source1`, `source2`, `higher_priority`, `merge`,
    /// or anything else as a literal value
    pub fn parse_action(action: &str) -> Self {
        match action.trim() {
            "source1" => ResolutionChoice::Source1,
            "source2" => ResolutionChoice::Source2,
            "higher_priority" => ResolutionChoice::HigherPriority,
            "merge" => ResolutionChoice::Merge,
            literal => ResolutionChoice::Custom(parse_literal(literal)),
        }
    }

    /// Build a choice from a rules-table value; strings go through
    /// [`ResolutionChoice::parse_action`], other values are literals
    pub fn from_rule_value(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::parse_action(s),
            other => ResolutionChoice::Custom(other.clone()),
        }
    }

    /// Value this choice selects for a conflict
    ///
    /// `Merge` on values that cannot be merged falls back to the
    /// higher-priority value.
    pub fn apply(&self, conflict: &Conflict) -> Value {
        match self {
            ResolutionChoice::Source1 => conflict.value1.clone(),
            ResolutionChoice::Source2 => conflict.value2.clone(),
            ResolutionChoice::HigherPriority => conflict.higher_priority_value().clone(),
            ResolutionChoice::Merge => merge_values(&conflict.value1, &conflict.value2)
                .unwrap_or_else(|| {
                    warn!(
                        path = %conflict.path,
                        "Values cannot be merged, keeping higher priority value"
                    );
                    conflict.higher_priority_value().clone()
                }),
            ResolutionChoice::Custom(value) => value.clone(),
        }
    }
}

/// Parse text as structured data when possible, else keep it as a string
pub fn parse_literal(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Merge two lists or two maps
///
/// Lists become an order-preserving, duplicate-free union (left items first).
/// Maps combine key-wise with the right side winning. Anything else cannot
/// be merged.
pub fn merge_values(left: &Value, right: &Value) -> Option<Value> {
    match (left, right) {
        (Value::Array(a), Value::Array(b)) => Some(Value::Array(union_lists(a, b))),
        (Value::Object(a), Value::Object(b)) => {
            let mut merged = a.clone();
            for (key, value) in b {
                merged.insert(key.clone(), value.clone());
            }
            Some(Value::Object(merged))
        }
        _ => None,
    }
}

/// Order-preserving union without duplicates
pub fn union_lists(left: &[Value], right: &[Value]) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(left.len() + right.len());
    for item in left.iter().chain(right.iter()) {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}

/// One conflict per path, spanning the lowest and highest contenders
///
/// With three or more levels the same path can conflict more than once; the
/// later conflict's first side is then only the provisional winner. The
/// collapsed conflict keeps the first conflict's lower side and the last
/// conflict's higher side. Input is expected in merge order.
pub fn collapse_by_path(conflicts: &[Conflict]) -> Vec<Conflict> {
    let mut out: Vec<Conflict> = Vec::with_capacity(conflicts.len());
    for conflict in conflicts {
        match out.iter_mut().find(|c| c.path == conflict.path) {
            Some(existing) => {
                existing.source2 = conflict.source2.clone();
                existing.value2 = conflict.value2.clone();
                existing.priority2 = conflict.priority2;
                existing.conflict_type =
                    ConflictType::classify(&existing.value1, &existing.value2);
            }
            None => out.push(conflict.clone()),
        }
    }
    out
}

/// Progress through resolving a batch of conflicts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionSession {
    pub conflicts: Vec<Conflict>,
    /// Settled values keyed by conflict path
    pub resolutions: BTreeMap<String, Value>,
    /// Pattern rules consulted before asking, in insertion order
    pub auto_rules: Vec<(String, ResolutionChoice)>,
    /// Choice captured by "apply to all remaining"
    pub global_choice: Option<ResolutionChoice>,
    pub aborted: bool,
}

impl ResolutionSession {
    pub fn new(conflicts: Vec<Conflict>) -> Self {
        Self {
            conflicts,
            ..Default::default()
        }
    }

    pub fn with_auto_rule(mut self, pattern: impl Into<String>, choice: ResolutionChoice) -> Self {
        self.auto_rules.push((pattern.into(), choice));
        self
    }

    pub fn resolve(&mut self, conflict: &Conflict, choice: &ResolutionChoice) {
        self.resolutions
            .insert(conflict.path.clone(), choice.apply(conflict));
    }

    pub fn is_resolved(&self, path: &str) -> bool {
        self.resolutions.contains_key(path)
    }

    /// Choice from the auto rules or the captured global choice, if any
    pub fn preselected_choice(&self, conflict: &Conflict) -> Option<ResolutionChoice> {
        self.auto_rules
            .iter()
            .find(|(pattern, _)| glob_matches(pattern, &conflict.path))
            .map(|(_, choice)| choice.clone())
            .or_else(|| self.global_choice.clone())
    }

    /// Conflicts still without a resolution
    pub fn unresolved(&self) -> Vec<&Conflict> {
        self.conflicts
            .iter()
            .filter(|c| !self.resolutions.contains_key(&c.path))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.unresolved().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::ConflictType;
    use serde_json::json;

    pub(crate) fn sample_conflict(path: &str, v1: Value, v2: Value) -> Conflict {
        Conflict {
            path: path.to_string(),
            conflict_type: ConflictType::classify(&v1, &v2),
            source1: "enterprise".to_string(),
            value1: v1,
            priority1: 100,
            source2: "user".to_string(),
            value2: v2,
            priority2: 75,
        }
    }

    #[test]
    fn test_collapse_keeps_original_lower_side() {
        let mut lower = sample_conflict("settings.model", json!("project"), json!("team"));
        lower.source1 = "project".to_string();
        lower.source2 = "team".to_string();
        let mut upper = sample_conflict("settings.model", json!("team"), json!(3));
        upper.source1 = "team".to_string();
        let other = sample_conflict("settings.debug", json!(true), json!(false));

        let collapsed = collapse_by_path(&[lower, other, upper]);
        assert_eq!(collapsed.len(), 2);
        assert_eq!(collapsed[0].source1, "project");
        assert_eq!(collapsed[0].value1, json!("project"));
        assert_eq!(collapsed[0].source2, "user");
        assert_eq!(collapsed[0].value2, json!(3));
        assert_eq!(collapsed[0].conflict_type, ConflictType::Type);
        assert_eq!(collapsed[1].path, "settings.debug");
    }

    #[test]
    fn test_union_lists_preserves_order() {
        let merged = union_lists(&[json!("a"), json!("b")], &[json!("b"), json!("c"), json!("a")]);
        assert_eq!(merged, vec![json!("a"), json!("b"), json!("c")]);
    }

    #[test]
    fn test_merge_values_maps_right_wins() {
        let merged = merge_values(&json!({"a": 1, "b": 1}), &json!({"b": 2, "c": 3})).unwrap();
        assert_eq!(merged, json!({"a": 1, "b": 2, "c": 3}));
        assert!(merge_values(&json!(1), &json!([1])).is_none());
    }

    #[test]
    fn test_parse_action() {
        assert_eq!(ResolutionChoice::parse_action("source2"), ResolutionChoice::Source2);
        assert_eq!(
            ResolutionChoice::parse_action("42"),
            ResolutionChoice::Custom(json!(42))
        );
        assert_eq!(
            ResolutionChoice::parse_action("plain text"),
            ResolutionChoice::Custom(json!("plain text"))
        );
    }

    #[test]
    fn test_merge_choice_falls_back_to_higher_priority() {
        let conflict = sample_conflict("settings.level", json!(1), json!(2));
        assert_eq!(ResolutionChoice::Merge.apply(&conflict), json!(1));
    }

    #[test]
    fn test_session_tracks_unresolved() {
        let a = sample_conflict("a", json!(1), json!(2));
        let b = sample_conflict("b", json!(1), json!(2));
        let mut session = ResolutionSession::new(vec![a.clone(), b]);
        session.resolve(&a, &ResolutionChoice::Source2);
        assert_eq!(session.unresolved().len(), 1);
        assert_eq!(session.resolutions["a"], json!(2));
        assert!(!session.is_complete());
    }
}
