//! Conflict records produced by the merge engine
//!
//! A conflict is data, not an error: every discrepancy between two sources
//! yields exactly one record, however it is resolved afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of discrepancy found at a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictType {
    /// Same type, different values
    Value,
    /// Different value types
    Type,
    /// Two differing lists
    Array,
    /// The merged result broke a structural rule
    PolicyViolation,
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConflictType::Value => "VALUE",
            ConflictType::Type => "TYPE",
            ConflictType::Array => "ARRAY",
            ConflictType::PolicyViolation => "POLICY_VIOLATION",
        };
        f.write_str(name)
    }
}

impl ConflictType {
    /// Classify two differing values
    pub fn classify(existing: &Value, incoming: &Value) -> Self {
        match (existing, incoming) {
            (Value::Array(_), Value::Array(_)) => ConflictType::Array,
            _ if value_kind(existing) == value_kind(incoming) => ConflictType::Value,
            _ => ConflictType::Type,
        }
    }
}

/// Name of a value's variant, used for type comparison and messages
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

/// A recorded discrepancy between two sources at a dot-path
///
/// `source1` is the side already accumulated (applied earlier), `source2`
/// the incoming side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub path: String,
    pub conflict_type: ConflictType,
    pub source1: String,
    pub value1: Value,
    pub priority1: i64,
    pub source2: String,
    pub value2: Value,
    pub priority2: i64,
}

impl Conflict {
    /// The second (later-applied) source wins ties
    fn second_wins(&self) -> bool {
        self.priority2 >= self.priority1
    }

    pub fn higher_priority_value(&self) -> &Value {
        if self.second_wins() {
            &self.value2
        } else {
            &self.value1
        }
    }

    pub fn lower_priority_value(&self) -> &Value {
        if self.second_wins() {
            &self.value1
        } else {
            &self.value2
        }
    }

    pub fn higher_priority_source(&self) -> &str {
        if self.second_wins() {
            &self.source2
        } else {
            &self.source1
        }
    }

    pub fn lower_priority_source(&self) -> &str {
        if self.second_wins() {
            &self.source1
        } else {
            &self.source2
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} conflict at '{}': {}={} (priority {}) vs {}={} (priority {})",
            self.conflict_type,
            self.path,
            self.source1,
            self.value1,
            self.priority1,
            self.source2,
            self.value2,
            self.priority2
        )
    }
}
