//! Deep and nuclear merging of prioritized raw documents

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::policy::{MergeStrategy, PolicyOutcome, ResolutionPolicy};
use super::rules::{MergeRule, RuleEngine};
use crate::conflict::{Conflict, ConflictType};
use crate::error::{ConfigError, ConfigResult};
use crate::level::{sort_by_priority, RawConfig};
use crate::path::{get_path, join, set_path};
use crate::resolve::{collapse_by_path, ConflictResolver};
use crate::schema::SchemaValidator;

/// Nesting depth past which maps are compared as opaque values
pub const MAX_MERGE_DEPTH: usize = 64;

/// Path reported for schema fallback conflicts
pub const ROOT_PATH: &str = "$";

/// Output of one merge run, also used as the merge preview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeResult {
    pub merged: Value,
    pub conflicts: Vec<Conflict>,
    /// Sources in application order (ascending priority)
    pub sources: Vec<String>,
    pub strategy: MergeStrategy,
    pub policy: ResolutionPolicy,
    /// The structural result failed validation and was replaced
    pub fell_back: bool,
}

impl MergeResult {
    pub fn get(&self, path: &str) -> Option<&Value> {
        get_path(&self.merged, path)
    }

    pub fn conflicts_at(&self, path: &str) -> Vec<&Conflict> {
        self.conflicts.iter().filter(|c| c.path == path).collect()
    }
}

#[derive(Debug, Clone)]
struct Origin {
    source: String,
    priority: i64,
}

#[derive(Default)]
struct MergeState {
    conflicts: Vec<Conflict>,
    origins: HashMap<String, Origin>,
    deferred: Vec<Conflict>,
}

impl MergeState {
    /// Origin of the accumulated value at `path`, from the nearest recorded ancestor
    fn origin_of(&self, path: &str) -> Origin {
        let mut candidate = path;
        loop {
            if let Some(origin) = self.origins.get(candidate) {
                return origin.clone();
            }
            match candidate.rfind('.') {
                Some(idx) => candidate = &candidate[..idx],
                None => {
                    return Origin {
                        source: "unknown".to_string(),
                        priority: 0,
                    }
                }
            }
        }
    }

    fn record_origin(&mut self, path: &str, origin: Origin) {
        let prefix = format!("{}.", path);
        self.origins.retain(|k, _| !k.starts_with(&prefix));
        self.origins.insert(path.to_string(), origin);
    }
}

fn is_metadata_path(path: &str) -> bool {
    path == "metadata" || path.starts_with("metadata.")
}

/// Combines raw documents into one effective configuration
pub struct MergeEngine {
    strategy: MergeStrategy,
    policy: ResolutionPolicy,
    strict_types: bool,
    rules: RuleEngine,
    validator: Option<SchemaValidator>,
    resolver: Option<Arc<dyn ConflictResolver>>,
}

impl Default for MergeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MergeEngine {
    /// Deep merge, higher-priority wins, no validation, no rules
    pub fn new() -> Self {
        Self {
            strategy: MergeStrategy::Deep,
            policy: ResolutionPolicy::HigherPriority,
            strict_types: false,
            rules: RuleEngine::new(),
            validator: None,
            resolver: None,
        }
    }

    pub fn with_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_policy(mut self, policy: ResolutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Abort instead of resolving when value types differ
    pub fn with_strict_types(mut self, strict: bool) -> Self {
        self.strict_types = strict;
        self
    }

    pub fn with_rules(mut self, rules: RuleEngine) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_rule(mut self, rule: MergeRule) -> Self {
        self.rules.add_rule(rule);
        self
    }

    pub fn with_validator(mut self, validator: SchemaValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ConflictResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn strategy(&self) -> MergeStrategy {
        self.strategy
    }

    pub fn policy(&self) -> ResolutionPolicy {
        self.policy
    }

    /// Merge raw documents; input order does not matter, priority does
    ///
    /// Only the ABORT policy (or strict type checking) makes this fail.
    pub fn merge(&self, configs: &[RawConfig]) -> ConfigResult<MergeResult> {
        let mut sorted = configs.to_vec();
        sort_by_priority(&mut sorted);
        let sources: Vec<String> = sorted.iter().map(RawConfig::source).collect();

        let declares_override = sorted.last().is_some_and(RawConfig::declares_override);
        if self.strategy == MergeStrategy::Nuclear || declares_override {
            return Ok(self.nuclear(&sorted, sources));
        }

        let (mut merged, mut conflicts) = self.deep_merge(&sorted)?;
        let mut fell_back = false;

        if let (Some(validator), Some(top)) = (&self.validator, sorted.last()) {
            if let Err(errors) = validator.validate(&merged) {
                warn!(
                    errors = ?errors,
                    fallback = %top.source(),
                    "Merged configuration failed validation, falling back to highest priority source"
                );
                merged = top.document.clone();
                fell_back = true;
                conflicts.push(Conflict {
                    path: ROOT_PATH.to_string(),
                    conflict_type: ConflictType::PolicyViolation,
                    source1: "merge".to_string(),
                    value1: json!(errors),
                    priority1: 0,
                    source2: top.source(),
                    value2: Value::Null,
                    priority2: top.priority(),
                });
            }
        }

        if !self.rules.is_empty() {
            let changed = self.rules.apply(&mut merged, &sorted)?;
            debug!(changed, "Custom merge rules applied");
        }

        info!(
            sources = sources.len(),
            conflicts = conflicts.len(),
            fell_back,
            "Configuration merged"
        );

        Ok(MergeResult {
            merged,
            conflicts,
            sources,
            strategy: MergeStrategy::Deep,
            policy: self.policy,
            fell_back,
        })
    }

    fn nuclear(&self, sorted: &[RawConfig], sources: Vec<String>) -> MergeResult {
        let merged = sorted
            .last()
            .map(|c| c.document.clone())
            .unwrap_or_else(|| Value::Object(Map::new()));
        debug!(source = ?sorted.last().map(RawConfig::source), "Nuclear merge");
        MergeResult {
            merged,
            conflicts: Vec::new(),
            sources,
            strategy: MergeStrategy::Nuclear,
            policy: self.policy,
            fell_back: false,
        }
    }

    fn deep_merge(&self, sorted: &[RawConfig]) -> ConfigResult<(Value, Vec<Conflict>)> {
        let mut accumulated = Map::new();
        let mut state = MergeState::default();

        for raw in sorted {
            let Some(document) = raw.document.as_object() else {
                continue;
            };
            let origin = Origin {
                source: raw.source(),
                priority: raw.priority(),
            };
            self.merge_map(&mut accumulated, document, "", &origin, 0, &mut state)?;
        }

        let mut merged = Value::Object(accumulated);
        if !state.deferred.is_empty() {
            self.apply_resolver(&mut merged, &state.deferred)?;
        }
        Ok((merged, state.conflicts))
    }

    fn merge_map(
        &self,
        target: &mut Map<String, Value>,
        incoming: &Map<String, Value>,
        prefix: &str,
        origin: &Origin,
        depth: usize,
        state: &mut MergeState,
    ) -> ConfigResult<()> {
        for (key, value) in incoming {
            let path = join(prefix, key);

            let Some(existing) = target.get_mut(key) else {
                target.insert(key.clone(), value.clone());
                state.record_origin(&path, origin.clone());
                continue;
            };

            if let (Value::Object(existing_map), Value::Object(incoming_map)) =
                (&mut *existing, value)
            {
                if depth + 1 < MAX_MERGE_DEPTH {
                    self.merge_map(existing_map, incoming_map, &path, origin, depth + 1, state)?;
                    continue;
                }
            }

            if existing == value {
                continue;
            }

            if is_metadata_path(&path) {
                *existing = value.clone();
                state.record_origin(&path, origin.clone());
                continue;
            }

            let previous = state.origin_of(&path);
            let conflict = Conflict {
                path: path.clone(),
                conflict_type: ConflictType::classify(existing, value),
                source1: previous.source.clone(),
                value1: existing.clone(),
                priority1: previous.priority,
                source2: origin.source.clone(),
                value2: value.clone(),
                priority2: origin.priority,
            };

            let resolved = self.decide(&conflict, state)?;
            let winner = if resolved == conflict.value1 {
                previous
            } else if resolved == conflict.value2 {
                origin.clone()
            } else if conflict.priority2 >= conflict.priority1 {
                origin.clone()
            } else {
                previous
            };

            debug!(
                path = %conflict.path,
                conflict_type = %conflict.conflict_type,
                winner = %winner.source,
                "Conflict resolved"
            );
            *existing = resolved;
            state.record_origin(&path, winner);
            state.conflicts.push(conflict);
        }
        Ok(())
    }

    fn decide(&self, conflict: &Conflict, state: &mut MergeState) -> ConfigResult<Value> {
        let aborted = || ConfigError::MergeAborted {
            path: conflict.path.clone(),
            source1: conflict.source1.clone(),
            source2: conflict.source2.clone(),
        };

        if self.strict_types && conflict.conflict_type == ConflictType::Type {
            return Err(aborted());
        }

        match self.policy.decide(conflict) {
            PolicyOutcome::Resolved(value) => Ok(value),
            PolicyOutcome::Deferred(value) => {
                if self.resolver.is_some() {
                    state.deferred.push(conflict.clone());
                } else {
                    warn!(
                        path = %conflict.path,
                        "Interactive policy without a resolver, using higher priority value"
                    );
                }
                Ok(value)
            }
            PolicyOutcome::Abort => Err(aborted()),
        }
    }

    fn apply_resolver(&self, merged: &mut Value, deferred: &[Conflict]) -> ConfigResult<()> {
        let Some(resolver) = &self.resolver else {
            return Ok(());
        };
        let session = resolver.resolve(&collapse_by_path(deferred))?;
        for (path, value) in &session.resolutions {
            if let Err(e) = set_path(merged, path, value.clone(), true) {
                warn!(path = %path, error = %e, "Resolution could not be written, keeping merged value");
            }
        }
        if session.aborted {
            warn!(
                unresolved = session.unresolved().len(),
                "Resolution session aborted, unresolved conflicts keep higher priority values"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::ConfigLevel;
    use crate::resolve::{BatchResolver, ResolutionChoice};

    fn raw(level: ConfigLevel, doc: Value) -> RawConfig {
        RawConfig::new(level, "config", doc)
    }

    #[test]
    fn test_single_level_is_identity() {
        let doc = json!({"settings": {"a": 1, "list": [1, 2]}, "tools": {}});
        let result = MergeEngine::new()
            .merge(&[raw(ConfigLevel::User, doc.clone())])
            .unwrap();
        assert_eq!(result.merged, doc);
        assert!(result.conflicts.is_empty());
    }

    #[test]
    fn test_disjoint_keys_union() {
        let result = MergeEngine::new()
            .merge(&[
                raw(ConfigLevel::User, json!({"settings": {"a": 1}})),
                raw(ConfigLevel::Project, json!({"settings": {"b": 2}, "tools": {"x": true}})),
            ])
            .unwrap();
        assert_eq!(
            result.merged,
            json!({"settings": {"a": 1, "b": 2}, "tools": {"x": true}})
        );
        assert!(result.conflicts.is_empty());
    }

    #[test]
    fn test_enterprise_beats_user() {
        let enterprise = raw(
            ConfigLevel::Enterprise,
            json!({"metadata": {"source": "enterprise", "priority": 100}, "settings": {"auto_sync": true}}),
        );
        let user = raw(
            ConfigLevel::User,
            json!({"metadata": {"source": "user", "priority": 75}, "settings": {"auto_sync": false, "debug": true}}),
        );
        let result = MergeEngine::new().merge(&[enterprise, user]).unwrap();

        assert_eq!(result.get("settings.auto_sync"), Some(&json!(true)));
        assert_eq!(result.get("settings.debug"), Some(&json!(true)));
        assert_eq!(result.conflicts.len(), 1);
        let conflict = &result.conflicts[0];
        assert_eq!(conflict.path, "settings.auto_sync");
        assert_eq!(conflict.higher_priority_source(), "enterprise");
        assert_eq!(conflict.source1, "user");
        // metadata differences never produce conflicts
        assert_eq!(result.get("metadata.source"), Some(&json!("enterprise")));
    }

    #[test]
    fn test_lower_priority_policy() {
        let result = MergeEngine::new()
            .with_policy(ResolutionPolicy::LowerPriority)
            .merge(&[
                raw(ConfigLevel::Team, json!({"settings": {"x": "team"}})),
                raw(ConfigLevel::User, json!({"settings": {"x": "user"}})),
            ])
            .unwrap();
        assert_eq!(result.get("settings.x"), Some(&json!("team")));
        assert_eq!(result.conflicts.len(), 1);
    }

    #[test]
    fn test_merge_arrays_policy() {
        let result = MergeEngine::new()
            .with_policy(ResolutionPolicy::MergeArrays)
            .merge(&[
                raw(ConfigLevel::Team, json!({"tools": {"paths": ["a", "b"]}})),
                raw(ConfigLevel::User, json!({"tools": {"paths": ["c", "a", "d"]}})),
            ])
            .unwrap();
        assert_eq!(result.get("tools.paths"), Some(&json!(["a", "b", "c", "d"])));
        assert_eq!(result.conflicts[0].conflict_type, ConflictType::Array);
    }

    #[test]
    fn test_type_conflict_resolves_like_value() {
        let result = MergeEngine::new()
            .merge(&[
                raw(ConfigLevel::Team, json!({"settings": {"port": "8080"}})),
                raw(ConfigLevel::User, json!({"settings": {"port": 8080}})),
            ])
            .unwrap();
        assert_eq!(result.get("settings.port"), Some(&json!(8080)));
        assert_eq!(result.conflicts[0].conflict_type, ConflictType::Type);
    }

    #[test]
    fn test_strict_types_abort() {
        let err = MergeEngine::new()
            .with_strict_types(true)
            .merge(&[
                raw(ConfigLevel::Team, json!({"settings": {"port": "8080"}})),
                raw(ConfigLevel::User, json!({"settings": {"port": 8080}})),
            ])
            .unwrap_err();
        assert!(matches!(err, ConfigError::MergeAborted { .. }));
    }

    #[test]
    fn test_abort_policy() {
        let err = MergeEngine::new()
            .with_policy(ResolutionPolicy::Abort)
            .merge(&[
                raw(ConfigLevel::Team, json!({"a": 1})),
                raw(ConfigLevel::User, json!({"a": 2})),
            ])
            .unwrap_err();
        match err {
            ConfigError::MergeAborted { path, .. } => assert_eq!(path, "a"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_nuclear_returns_top_document() {
        let top = json!({"metadata": {"priority": 100}, "settings": {"only": true}});
        let result = MergeEngine::new()
            .with_strategy(MergeStrategy::Nuclear)
            .merge(&[
                raw(ConfigLevel::Enterprise, top.clone()),
                raw(ConfigLevel::User, json!({"settings": {"only": false, "more": 1}})),
            ])
            .unwrap();
        assert_eq!(result.merged, top);
        assert!(result.conflicts.is_empty());
        assert_eq!(result.strategy, MergeStrategy::Nuclear);
    }

    #[test]
    fn test_declared_override_switches_to_nuclear() {
        let top = json!({"metadata": {"override": true}, "settings": {"x": 1}});
        let result = MergeEngine::new()
            .merge(&[
                raw(ConfigLevel::Team, json!({"settings": {"x": 2, "y": 3}})),
                raw(ConfigLevel::Enterprise, top.clone()),
            ])
            .unwrap();
        assert_eq!(result.merged, top);
    }

    #[test]
    fn test_source1_tracks_provenance_across_three_levels() {
        let result = MergeEngine::new()
            .merge(&[
                raw(ConfigLevel::Project, json!({"settings": {"x": "project"}})),
                raw(ConfigLevel::Team, json!({"settings": {"y": 1}})),
                raw(ConfigLevel::User, json!({"settings": {"x": "user"}})),
            ])
            .unwrap();
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].source1, "project");
        assert_eq!(result.conflicts[0].source2, "user");
    }

    #[test]
    fn test_schema_failure_falls_back() {
        let user = json!({"settings": {"a": 1}});
        let result = MergeEngine::new()
            .with_validator(SchemaValidator::with_default_schema().unwrap())
            .merge(&[
                raw(ConfigLevel::Team, json!({"tools": [1, 2]})),
                raw(ConfigLevel::User, user.clone()),
            ])
            .unwrap();
        assert!(result.fell_back);
        assert_eq!(result.merged, user);
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].conflict_type, ConflictType::PolicyViolation);
        assert_eq!(result.conflicts[0].source2, "user");
    }

    #[test]
    fn test_interactive_uses_resolver() {
        let resolver = BatchResolver::new().with_rule("*.debug", ResolutionChoice::Source1);
        let result = MergeEngine::new()
            .with_policy(ResolutionPolicy::Interactive)
            .with_resolver(Arc::new(resolver))
            .merge(&[
                raw(ConfigLevel::Team, json!({"settings": {"debug": true, "x": 1}})),
                raw(ConfigLevel::User, json!({"settings": {"debug": false, "x": 2}})),
            ])
            .unwrap();
        assert_eq!(result.get("settings.debug"), Some(&json!(true)));
        assert_eq!(result.get("settings.x"), Some(&json!(2)));
        assert_eq!(result.conflicts.len(), 2);
    }

    #[test]
    fn test_interactive_asks_once_per_path() {
        let resolver = BatchResolver::new().with_rule("*.model", ResolutionChoice::Source1);
        let result = MergeEngine::new()
            .with_policy(ResolutionPolicy::Interactive)
            .with_resolver(Arc::new(resolver))
            .merge(&[
                raw(ConfigLevel::Project, json!({"settings": {"model": "project"}})),
                raw(ConfigLevel::Team, json!({"settings": {"model": "team"}})),
                raw(ConfigLevel::User, json!({"settings": {"model": "user"}})),
            ])
            .unwrap();
        assert_eq!(result.get("settings.model"), Some(&json!("project")));
        assert_eq!(result.conflicts.len(), 2);
    }

    #[test]
    fn test_resolution_under_replaced_parent_is_skipped() {
        let resolver = BatchResolver::new().with_rule("*.name", ResolutionChoice::Source1);
        let result = MergeEngine::new()
            .with_policy(ResolutionPolicy::Interactive)
            .with_resolver(Arc::new(resolver))
            .merge(&[
                raw(ConfigLevel::Project, json!({"model": {"name": "a"}})),
                raw(ConfigLevel::Team, json!({"model": {"name": "b"}})),
                raw(ConfigLevel::User, json!({"model": "flat"})),
            ])
            .unwrap();
        assert_eq!(result.get("model"), Some(&json!("flat")));
    }

    #[test]
    fn test_interactive_without_resolver_uses_priority() {
        let result = MergeEngine::new()
            .with_policy(ResolutionPolicy::Interactive)
            .merge(&[
                raw(ConfigLevel::Team, json!({"a": 1})),
                raw(ConfigLevel::User, json!({"a": 2})),
            ])
            .unwrap();
        assert_eq!(result.get("a"), Some(&json!(2)));
    }

    #[test]
    fn test_rules_run_after_merge() {
        let result = MergeEngine::new()
            .with_policy(ResolutionPolicy::MergeArrays)
            .with_rule(MergeRule::string_concat("settings.flags", " ").unwrap())
            .merge(&[
                raw(ConfigLevel::Team, json!({"settings": {"flags": ["-a"]}})),
                raw(ConfigLevel::User, json!({"settings": {"flags": ["-b"]}})),
            ])
            .unwrap();
        assert_eq!(result.get("settings.flags"), Some(&json!("-a -b")));
    }

    #[test]
    fn test_deep_nesting_is_bounded() {
        let mut deep_a = json!("a");
        let mut deep_b = json!("b");
        for _ in 0..(MAX_MERGE_DEPTH + 10) {
            deep_a = json!({ "n": deep_a });
            deep_b = json!({ "n": deep_b });
        }
        let result = MergeEngine::new()
            .merge(&[raw(ConfigLevel::Team, deep_a), raw(ConfigLevel::User, deep_b.clone())])
            .unwrap();
        assert_eq!(result.merged, deep_b);
        assert_eq!(result.conflicts.len(), 1);
    }
}
