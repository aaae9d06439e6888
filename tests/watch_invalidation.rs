//! Background watcher behavior as seen through the hierarchy manager

use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stratum::{ChangeEvent, ChangeKind, ConfigLevel, HierarchyManager, HierarchySettings};
use stratum_storage::{CallbackResult, FileConfigStore, PathResolver, WatchBackendKind};
use tempfile::TempDir;

fn polling_manager(dir: &TempDir) -> HierarchyManager {
    let settings = HierarchySettings {
        watch_backend: WatchBackendKind::Polling,
        poll_interval_ms: 25,
        debounce_ms: 400,
        ..HierarchySettings::default()
    };
    let store = FileConfigStore::new(PathResolver::rooted(dir.path()));
    HierarchyManager::with_store(settings, Arc::new(store)).unwrap()
}

#[test]
fn rapid_edits_notify_once_and_refresh_the_view() {
    let dir = TempDir::new().unwrap();
    let user_dir = dir.path().join("user");
    std::fs::create_dir_all(&user_dir).unwrap();
    let file = user_dir.join("config.json");
    std::fs::write(&file, r#"{"settings": {"level": 0}}"#).unwrap();

    let manager = polling_manager(&dir);
    assert_eq!(
        manager.get_config_value("settings.level", Value::Null, None),
        json!(0)
    );

    let modified = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&modified);
    manager.add_watcher(Arc::new(move |event: &ChangeEvent| -> CallbackResult {
        if event.kind == ChangeKind::Modified {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }));
    manager.start_watching().unwrap();

    for level in 1..=5 {
        let padding = " ".repeat(level);
        std::fs::write(
            &file,
            format!(r#"{{"settings": {{"level": {}}}}}{}"#, level, padding),
        )
        .unwrap();
        std::thread::sleep(Duration::from_millis(30));
    }
    std::thread::sleep(Duration::from_millis(1200));
    manager.stop_watching();

    assert_eq!(modified.load(Ordering::SeqCst), 1);
    assert_eq!(
        manager.get_config_value("settings.level", Value::Null, None),
        json!(5)
    );
}

#[test]
fn removed_watcher_is_not_called() {
    let dir = TempDir::new().unwrap();
    let manager = polling_manager(&dir);
    manager
        .set_config_value("settings.debug", json!(true), ConfigLevel::User, true)
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let id = manager.add_watcher(Arc::new(move |_event: &ChangeEvent| -> CallbackResult {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));
    assert!(manager.remove_watcher(id));
    assert!(!manager.remove_watcher(id));

    manager.start_watching().unwrap();
    manager
        .set_config_value("settings.debug", json!(false), ConfigLevel::User, false)
        .unwrap();
    manager.force_check();
    manager.stop_watching();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
