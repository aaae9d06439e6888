//! Stratum: one merged view over layered configuration
//!
//! Enterprise, user, team and project documents are discovered on disk,
//! merged by priority and served through [`HierarchyManager`]. Results are
//! cached with a TTL, and writes (or on-disk edits seen by the watcher)
//! clear the cache.
//!
//! Construct a manager once and pass it to whatever needs configuration.
//! [`global_manager`] exists for default wiring only.
//!
//! ```ignore
//! use stratum::{HierarchyManager, HierarchySettings};
//! use serde_json::json;
//!
//! let manager = HierarchyManager::new(HierarchySettings::from_env())?;
//! let debug = manager.get_config_value("settings.debug", json!(false), None);
//! ```

pub mod cache;
pub mod error;
pub mod manager;
pub mod settings;

use std::sync::OnceLock;

use parking_lot::{const_mutex, Mutex};

pub use cache::{CacheEntry, CacheStats, MergeCache};
pub use error::{HierarchyError, HierarchyResult};
pub use manager::HierarchyManager;
pub use settings::HierarchySettings;

pub use stratum_core::{
    ConfigLevel, Conflict, ConflictResolver, ConflictType, MergeResult, MergeRuleType,
    MergeStrategy, ResolutionPolicy,
};
pub use stratum_storage::{ChangeEvent, ChangeKind, HierarchyIssue, SubscriberId};

static GLOBAL_MANAGER: OnceLock<HierarchyManager> = OnceLock::new();
static GLOBAL_INIT: Mutex<()> = const_mutex(());

/// Process-wide manager built from defaults and `STRATUM_*` overrides
///
/// Built once on first call; a failed build is retried on the next call.
pub fn global_manager() -> HierarchyResult<&'static HierarchyManager> {
    if let Some(manager) = GLOBAL_MANAGER.get() {
        return Ok(manager);
    }

    let _guard = GLOBAL_INIT.lock();
    if let Some(manager) = GLOBAL_MANAGER.get() {
        return Ok(manager);
    }
    let manager = HierarchyManager::new(HierarchySettings::from_env())?;
    Ok(GLOBAL_MANAGER.get_or_init(|| manager))
}
