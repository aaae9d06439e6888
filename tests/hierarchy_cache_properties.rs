//! Property-based tests for the merged view served by the hierarchy manager
//!
//! - Reads within the TTL are served from the cache and agree with a fresh merge
//! - Every write is visible on the very next read
//! - Merging the same level set twice yields identical output

use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;
use stratum::{ConfigLevel, HierarchyManager, HierarchySettings};
use stratum_core::MergeEngine;
use stratum_storage::{
    DiscoverySettings, FileConfigStore, HierarchyDiscoverer, PathResolver,
};
use tempfile::TempDir;

fn level_strategy() -> impl Strategy<Value = ConfigLevel> {
    prop_oneof![
        Just(ConfigLevel::Enterprise),
        Just(ConfigLevel::User),
        Just(ConfigLevel::Team),
        Just(ConfigLevel::Project),
    ]
}

fn key_strategy() -> impl Strategy<Value = String> {
    r"[a-z]{1,6}".prop_map(|s| s)
}

fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| json!(n)),
        r"[a-z ]{0,8}".prop_map(Value::String),
    ]
}

fn manager(dir: &TempDir) -> HierarchyManager {
    let store = FileConfigStore::new(PathResolver::rooted(dir.path()));
    HierarchyManager::with_store(HierarchySettings::default(), Arc::new(store)).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// A write through the manager is what the next read returns, when no
    /// higher level shadows the key
    #[test]
    fn prop_write_visible_on_next_read(
        writes in prop::collection::vec((level_strategy(), key_strategy(), scalar_strategy()), 1..6)
    ) {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);

        for (level, key, value) in &writes {
            let path = format!("settings.{}", key);
            manager.set_config_value(&path, value.clone(), *level, true).unwrap();

            let read = manager.get_config_value(&path, Value::Null, Some(&[*level]));
            prop_assert_eq!(&read, value);
        }
    }

    /// Cached reads equal an uncached merge of the same levels
    #[test]
    fn prop_cached_view_matches_fresh_merge(
        writes in prop::collection::vec((level_strategy(), key_strategy(), scalar_strategy()), 1..8)
    ) {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        for (level, key, value) in &writes {
            manager
                .set_config_value(&format!("settings.{}", key), value.clone(), *level, true)
                .unwrap();
        }

        let cached_first = manager.get_config(None).unwrap();
        let cached_second = manager.get_config(None).unwrap();
        prop_assert_eq!(&cached_first, &cached_second);

        let store = Arc::new(FileConfigStore::new(PathResolver::rooted(dir.path())));
        let discoverer = HierarchyDiscoverer::new(store, DiscoverySettings::default());
        let fresh = discoverer
            .get_effective_configuration(None, &MergeEngine::new())
            .unwrap();
        prop_assert_eq!(&cached_first, &fresh.merged);
    }

    /// Two merges of the same hierarchy serialize identically
    #[test]
    fn prop_merge_is_idempotent(
        writes in prop::collection::vec((level_strategy(), key_strategy(), scalar_strategy()), 1..8)
    ) {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        for (level, key, value) in &writes {
            manager
                .set_config_value(&format!("settings.{}", key), value.clone(), *level, true)
                .unwrap();
        }

        let first = manager.get_merge_preview(None).unwrap();
        manager.clear_cache();
        let second = manager.get_merge_preview(None).unwrap();

        prop_assert_eq!(
            serde_json::to_string(&first.merged).unwrap(),
            serde_json::to_string(&second.merged).unwrap()
        );
        prop_assert_eq!(first.conflicts, second.conflicts);
    }
}
