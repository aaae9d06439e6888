//! Severity-graded conflict tracking
//!
//! Higher-level objects (named artifacts, tool settings, files, dependency
//! graphs) reuse the conflict primitive through [`TrackedConflict`], which
//! adds a kind from a richer taxonomy, a severity, and an optional
//! suggested resolution. [`ConflictTracker::auto_resolve_conflicts`] applies
//! suggestions up to a severity threshold and leaves the rest for a human.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::conflict::{Conflict, ConflictType};
use crate::resolve::merge_values;

/// Conflict severity, ordered LOW < MEDIUM < HIGH < CRITICAL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ConflictSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConflictSeverity::Low => "low",
            ConflictSeverity::Medium => "medium",
            ConflictSeverity::High => "high",
            ConflictSeverity::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// Richer conflict taxonomy for domain objects built on the merged config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    // plain configuration conflicts
    Value,
    Type,
    Array,
    PolicyViolation,
    // named artifacts
    Name,
    Content,
    Metadata,
    Version,
    // configuration keys
    Schema,
    Path,
    // external tool integrations
    Settings,
    // files
    Modification,
    Deletion,
    Permission,
    // dependency graphs
    Dependency,
    CircularDependency,
}

impl ConflictKind {
    /// Severity assigned when the caller does not pick one
    pub fn default_severity(&self) -> ConflictSeverity {
        match self {
            ConflictKind::Value
            | ConflictKind::Array
            | ConflictKind::Metadata
            | ConflictKind::Settings => ConflictSeverity::Low,
            ConflictKind::Type
            | ConflictKind::Name
            | ConflictKind::Content
            | ConflictKind::Version
            | ConflictKind::Path
            | ConflictKind::Modification => ConflictSeverity::Medium,
            ConflictKind::PolicyViolation
            | ConflictKind::Schema
            | ConflictKind::Deletion
            | ConflictKind::Dependency => ConflictSeverity::High,
            ConflictKind::Permission | ConflictKind::CircularDependency => {
                ConflictSeverity::Critical
            }
        }
    }
}

impl From<ConflictType> for ConflictKind {
    fn from(t: ConflictType) -> Self {
        match t {
            ConflictType::Value => ConflictKind::Value,
            ConflictType::Type => ConflictKind::Type,
            ConflictType::Array => ConflictKind::Array,
            ConflictType::PolicyViolation => ConflictKind::PolicyViolation,
        }
    }
}

/// How a tracked conflict was (or should be) settled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", content = "value", rename_all = "snake_case")]
pub enum SuggestedResolution {
    KeepFirst,
    KeepSecond,
    Merge,
    UseValue(Value),
}

/// Resolution applied to a tracked conflict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedResolution {
    pub strategy: SuggestedResolution,
    pub value: Value,
    pub automatic: bool,
    pub resolved_at: DateTime<Utc>,
}

/// A conflict with kind, severity and resolution bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedConflict {
    pub id: u64,
    pub kind: ConflictKind,
    pub severity: ConflictSeverity,
    /// Path, artifact name, or file the conflict concerns
    pub subject: String,
    pub description: String,
    pub source1: String,
    pub value1: Value,
    pub source2: String,
    pub value2: Value,
    pub suggestion: Option<SuggestedResolution>,
    pub resolution: Option<AppliedResolution>,
}

impl TrackedConflict {
    /// Build a conflict of the given kind with its default severity
    pub fn new(
        kind: ConflictKind,
        subject: impl Into<String>,
        (source1, value1): (impl Into<String>, Value),
        (source2, value2): (impl Into<String>, Value),
    ) -> Self {
        let subject = subject.into();
        Self {
            id: 0,
            kind,
            severity: kind.default_severity(),
            description: format!("{:?} conflict on {}", kind, subject),
            subject,
            source1: source1.into(),
            value1,
            source2: source2.into(),
            value2,
            suggestion: None,
            resolution: None,
        }
    }

    pub fn with_severity(mut self, severity: ConflictSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_suggestion(mut self, suggestion: SuggestedResolution) -> Self {
        self.suggestion = Some(suggestion);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Wrap a merge conflict; the suggestion follows the default priority winner
    pub fn from_config_conflict(conflict: &Conflict) -> Self {
        let kind = ConflictKind::from(conflict.conflict_type);
        let suggestion = match conflict.conflict_type {
            ConflictType::Array => SuggestedResolution::Merge,
            _ if conflict.priority2 >= conflict.priority1 => SuggestedResolution::KeepSecond,
            _ => SuggestedResolution::KeepFirst,
        };
        Self::new(
            kind,
            conflict.path.clone(),
            (conflict.source1.clone(), conflict.value1.clone()),
            (conflict.source2.clone(), conflict.value2.clone()),
        )
        .with_description(conflict.to_string())
        .with_suggestion(suggestion)
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    /// Value a strategy produces for this conflict, if it can produce one
    pub fn value_for(&self, strategy: &SuggestedResolution) -> Option<Value> {
        match strategy {
            SuggestedResolution::KeepFirst => Some(self.value1.clone()),
            SuggestedResolution::KeepSecond => Some(self.value2.clone()),
            SuggestedResolution::Merge => merge_values(&self.value1, &self.value2),
            SuggestedResolution::UseValue(v) => Some(v.clone()),
        }
    }
}

/// Collection of tracked conflicts with resolution sweeps
#[derive(Debug, Default, Clone)]
pub struct ConflictTracker {
    conflicts: Vec<TrackedConflict>,
    next_id: u64,
}

impl ConflictTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a conflict, returning its assigned id
    pub fn add(&mut self, mut conflict: TrackedConflict) -> u64 {
        self.next_id += 1;
        conflict.id = self.next_id;
        self.conflicts.push(conflict);
        self.next_id
    }

    /// Track every merge conflict from a merge run
    pub fn extend_from_merge(&mut self, conflicts: &[Conflict]) -> Vec<u64> {
        conflicts
            .iter()
            .map(|c| self.add(TrackedConflict::from_config_conflict(c)))
            .collect()
    }

    pub fn get(&self, id: u64) -> Option<&TrackedConflict> {
        self.conflicts.iter().find(|c| c.id == id)
    }

    pub fn all(&self) -> &[TrackedConflict] {
        &self.conflicts
    }

    pub fn unresolved(&self) -> Vec<&TrackedConflict> {
        self.conflicts.iter().filter(|c| !c.is_resolved()).collect()
    }

    /// Manually resolve a conflict; returns false when the id is unknown
    /// or the strategy cannot produce a value
    pub fn resolve(&mut self, id: u64, strategy: SuggestedResolution) -> bool {
        let Some(conflict) = self.conflicts.iter_mut().find(|c| c.id == id) else {
            return false;
        };
        match conflict.value_for(&strategy) {
            Some(value) => {
                conflict.resolution = Some(AppliedResolution {
                    strategy,
                    value,
                    automatic: false,
                    resolved_at: Utc::now(),
                });
                true
            }
            None => false,
        }
    }

    /// Apply suggestions to unresolved conflicts at or below `max_severity`
    ///
    /// Conflicts above the threshold or without a usable suggestion are left
    /// untouched. Returns the number resolved.
    pub fn auto_resolve_conflicts(&mut self, max_severity: ConflictSeverity) -> usize {
        let mut resolved = 0;
        for conflict in self.conflicts.iter_mut() {
            if conflict.is_resolved() || conflict.severity > max_severity {
                continue;
            }
            let Some(suggestion) = conflict.suggestion.clone() else {
                continue;
            };
            if let Some(value) = conflict.value_for(&suggestion) {
                debug!(
                    id = conflict.id,
                    subject = %conflict.subject,
                    severity = %conflict.severity,
                    "Auto-resolved conflict"
                );
                conflict.resolution = Some(AppliedResolution {
                    strategy: suggestion,
                    value,
                    automatic: true,
                    resolved_at: Utc::now(),
                });
                resolved += 1;
            }
        }
        resolved
    }

    /// Count of unresolved conflicts per severity
    pub fn severity_summary(&self) -> BTreeMap<ConflictSeverity, usize> {
        let mut summary = BTreeMap::new();
        for conflict in self.conflicts.iter().filter(|c| !c.is_resolved()) {
            *summary.entry(conflict.severity).or_insert(0) += 1;
        }
        summary
    }

    pub fn clear(&mut self) {
        self.conflicts.clear();
    }
}
