//! End-to-end conflict scenarios across discovery, merging and resolution
//!
//! Level documents are written to a temporary tree, discovered through the
//! file store and merged with the policy under test.

use serde_json::{json, Value};
use std::sync::Arc;
use stratum::{ConfigLevel, HierarchyManager, HierarchySettings, ResolutionPolicy};
use stratum_core::{
    BatchResolver, ConflictKind, ConflictSeverity, ConflictTracker, ConflictType, MergeEngine,
    RawConfig, SuggestedResolution, TrackedConflict,
};
use stratum_storage::{FileConfigStore, PathResolver};
use tempfile::TempDir;

fn write_level(root: &std::path::Path, level: ConfigLevel, document: Value) {
    let dir = root.join(level.as_str());
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.json"), document.to_string()).unwrap();
}

fn manager(dir: &TempDir, settings: HierarchySettings) -> HierarchyManager {
    let store = FileConfigStore::new(PathResolver::rooted(dir.path()));
    HierarchyManager::with_store(settings, Arc::new(store)).unwrap()
}

#[test]
fn enterprise_policy_beats_user_preference() {
    let dir = TempDir::new().unwrap();
    write_level(
        dir.path(),
        ConfigLevel::Enterprise,
        json!({"metadata": {"source": "enterprise", "priority": 100},
               "settings": {"auto_sync": true}}),
    );
    write_level(
        dir.path(),
        ConfigLevel::User,
        json!({"metadata": {"source": "user", "priority": 75},
               "settings": {"auto_sync": false, "debug": true}}),
    );
    let manager = manager(&dir, HierarchySettings::default());

    let preview = manager.get_merge_preview(None).unwrap();
    assert_eq!(preview.get("settings.auto_sync"), Some(&json!(true)));
    assert_eq!(preview.get("settings.debug"), Some(&json!(true)));
    assert_eq!(preview.sources, vec!["user", "enterprise"]);

    let at_path = preview.conflicts_at("settings.auto_sync");
    assert_eq!(at_path.len(), 1);
    assert_eq!(at_path[0].conflict_type, ConflictType::Value);
    assert_eq!(at_path[0].higher_priority_source(), "enterprise");
    assert!(preview.conflicts_at("settings.debug").is_empty());
}

#[test]
fn batch_rule_picks_second_source_regardless_of_priority() {
    let dir = TempDir::new().unwrap();
    // declared priorities invert the level order, so the user side is applied first
    write_level(
        dir.path(),
        ConfigLevel::User,
        json!({"metadata": {"priority": 10}, "settings": {"debug": true}}),
    );
    write_level(
        dir.path(),
        ConfigLevel::Project,
        json!({"metadata": {"priority": 10}, "settings": {"debug": false}}),
    );
    let manager = manager(&dir, HierarchySettings::default());

    let rules = dir.path().join("rules.json");
    std::fs::write(&rules, r#"{"*.debug": "source2"}"#).unwrap();
    let resolver = BatchResolver::from_file(&rules).unwrap();

    let result = manager
        .resolve_configuration_conflicts(
            ResolutionPolicy::Interactive,
            None,
            Some(Arc::new(resolver)),
        )
        .unwrap();
    let conflict = &result.conflicts_at("settings.debug")[0];
    assert_eq!(result.get("settings.debug"), Some(&conflict.value2));
}

#[test]
fn merge_arrays_unions_lists_from_every_level() {
    let dir = TempDir::new().unwrap();
    write_level(dir.path(), ConfigLevel::Project, json!({"tools": {"paths": ["a", "b"]}}));
    write_level(dir.path(), ConfigLevel::Team, json!({"tools": {"paths": ["b", "c"]}}));
    write_level(dir.path(), ConfigLevel::User, json!({"tools": {"paths": ["d", "a"]}}));
    let settings = HierarchySettings {
        resolution_policy: ResolutionPolicy::MergeArrays,
        ..HierarchySettings::default()
    };
    let manager = manager(&dir, settings);

    assert_eq!(
        manager.get_config(None).unwrap()["tools"]["paths"],
        json!(["a", "b", "c", "d"])
    );
    assert_eq!(manager.get_configuration_conflicts(None).unwrap().len(), 2);
}

#[test]
fn strict_types_abort_mismatched_values() {
    let dir = TempDir::new().unwrap();
    write_level(dir.path(), ConfigLevel::Project, json!({"settings": {"timeout": "30s"}}));
    write_level(dir.path(), ConfigLevel::User, json!({"settings": {"timeout": 30}}));

    let lenient = manager(&dir, HierarchySettings::default());
    assert_eq!(
        lenient.get_config_value("settings.timeout", Value::Null, None),
        json!(30)
    );

    let strict = manager(
        &dir,
        HierarchySettings {
            strict_types: true,
            ..HierarchySettings::default()
        },
    );
    assert!(strict.get_config(None).is_err());
    assert_eq!(
        strict.get_config_value("settings.timeout", json!("default"), None),
        json!("default")
    );
}

#[test]
fn auto_resolve_leaves_high_severity_for_review() {
    let enterprise = RawConfig::new(
        ConfigLevel::Enterprise,
        "config",
        json!({"settings": {"model": "large", "tags": ["x"]}}),
    );
    let user = RawConfig::new(
        ConfigLevel::User,
        "config",
        json!({"settings": {"model": "small", "tags": ["y"]}}),
    );
    let result = MergeEngine::new().merge(&[user, enterprise]).unwrap();

    let mut tracker = ConflictTracker::new();
    tracker.extend_from_merge(&result.conflicts);
    tracker.add(TrackedConflict::new(
        ConflictKind::Permission,
        "agents.deploy",
        ("enterprise", json!("deny")),
        ("user", json!("allow")),
    ));
    tracker.add(
        TrackedConflict::new(
            ConflictKind::CircularDependency,
            "agents.review",
            ("team", json!(["agents.deploy"])),
            ("project", json!(["agents.review"])),
        )
        .with_suggestion(SuggestedResolution::KeepFirst),
    );

    let resolved = tracker.auto_resolve_conflicts(ConflictSeverity::Medium);
    assert_eq!(resolved, 2);

    let remaining: Vec<_> = tracker.unresolved();
    assert_eq!(remaining.len(), 2);
    assert!(remaining
        .iter()
        .all(|c| c.severity > ConflictSeverity::Medium));
}
