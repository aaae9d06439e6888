//! Stratum storage: where configuration levels live on disk
//!
//! - [`resolver`]: per-level directory resolution (env override, platform
//!   convention, upward project walk)
//! - [`loader`]: JSON/YAML/TOML documents as `serde_json::Value`
//! - [`store`]: the [`ConfigStore`] persistence collaborator with backups
//! - [`discovery`]: cached discovery, hierarchy loading and health checks
//! - [`watcher`]: debounced change notification over native events or polling

pub mod discovery;
pub mod error;
pub mod loader;
pub mod resolver;
pub mod store;
pub mod types;
pub mod watcher;

pub use discovery::{DiscoverySettings, HierarchyDiscoverer, HierarchyIssue, IssueKind};
pub use error::{IoOperation, StorageError, StorageResult};
pub use loader::ConfigLoader;
pub use resolver::PathResolver;
pub use store::{ConfigStore, FileConfigStore};
pub use types::{ConfigFormat, BACKUP_SUFFIX, DEFAULT_FILE_STEM, PROJECT_MARKER};
pub use watcher::{
    CallbackResult, ChangeCallback, ChangeEvent, ChangeKind, ChangeWatcher, SubscriberId,
    WatchBackendKind, WatchedPath, WatcherSettings,
};
