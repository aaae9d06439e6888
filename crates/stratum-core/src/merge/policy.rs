//! Merge strategies and conflict resolution policies

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conflict::{Conflict, ConflictType};
use crate::error::ConfigError;
use crate::resolve::union_lists;

/// How documents are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Recursive key-wise combination
    #[default]
    Deep,
    /// Highest-priority document replaces everything
    Nuclear,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeStrategy::Deep => f.write_str("deep"),
            MergeStrategy::Nuclear => f.write_str("nuclear"),
        }
    }
}

impl FromStr for MergeStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deep" | "deep_merge" => Ok(MergeStrategy::Deep),
            "nuclear" | "replace" => Ok(MergeStrategy::Nuclear),
            other => Err(ConfigError::internal(format!("unknown merge strategy '{}'", other))),
        }
    }
}

/// Policy applied uniformly whenever the deep merge finds a conflict
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    #[default]
    HigherPriority,
    LowerPriority,
    /// Union lists; anything else falls back to the higher priority value
    MergeArrays,
    /// Defer to a configured resolver after the structural pass
    Interactive,
    /// Fail the whole merge on the first conflict
    Abort,
}

impl fmt::Display for ResolutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolutionPolicy::HigherPriority => "higher_priority",
            ResolutionPolicy::LowerPriority => "lower_priority",
            ResolutionPolicy::MergeArrays => "merge_arrays",
            ResolutionPolicy::Interactive => "interactive",
            ResolutionPolicy::Abort => "abort",
        };
        f.write_str(name)
    }
}

impl FromStr for ResolutionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "higher_priority" | "higher" => Ok(ResolutionPolicy::HigherPriority),
            "lower_priority" | "lower" => Ok(ResolutionPolicy::LowerPriority),
            "merge_arrays" | "merge" => Ok(ResolutionPolicy::MergeArrays),
            "interactive" => Ok(ResolutionPolicy::Interactive),
            "abort" => Ok(ResolutionPolicy::Abort),
            other => Err(ConfigError::internal(format!(
                "unknown resolution policy '{}'",
                other
            ))),
        }
    }
}

/// What the policy decided for one conflict
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PolicyOutcome {
    Resolved(Value),
    /// Provisional value; a resolver gets the final say
    Deferred(Value),
    Abort,
}

impl ResolutionPolicy {
    pub(crate) fn decide(&self, conflict: &Conflict) -> PolicyOutcome {
        match self {
            ResolutionPolicy::HigherPriority => {
                PolicyOutcome::Resolved(conflict.higher_priority_value().clone())
            }
            ResolutionPolicy::LowerPriority => {
                PolicyOutcome::Resolved(conflict.lower_priority_value().clone())
            }
            ResolutionPolicy::MergeArrays => match (&conflict.value1, &conflict.value2) {
                (Value::Array(left), Value::Array(right))
                    if conflict.conflict_type == ConflictType::Array =>
                {
                    PolicyOutcome::Resolved(Value::Array(union_lists(left, right)))
                }
                _ => PolicyOutcome::Resolved(conflict.higher_priority_value().clone()),
            },
            ResolutionPolicy::Interactive => {
                PolicyOutcome::Deferred(conflict.higher_priority_value().clone())
            }
            ResolutionPolicy::Abort => PolicyOutcome::Abort,
        }
    }
}
