//! The hierarchy orchestrator
//!
//! [`HierarchyManager`] is the only surface downstream code should read
//! configuration through. It ties discovery, merging, the merge cache and
//! the change watcher together. Every write clears both the merge cache and
//! the discovery cache so the next read sees it.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{json, Value};
use stratum_core::{
    set_path, ConfigError, ConfigLevel, Conflict, ConflictResolver, MergeEngine, MergeResult,
    MergeRule, MergeRuleType, ResolutionPolicy, RuleEngine, SchemaValidator,
};
use stratum_storage::{
    CallbackResult, ChangeCallback, ChangeEvent, ChangeWatcher, ConfigStore, FileConfigStore,
    HierarchyDiscoverer, HierarchyIssue, PathResolver, SubscriberId, WatchBackendKind,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, MergeCache};
use crate::error::{HierarchyError, HierarchyResult};
use crate::settings::HierarchySettings;

pub struct HierarchyManager {
    settings: HierarchySettings,
    store: Arc<dyn ConfigStore>,
    discoverer: Arc<HierarchyDiscoverer>,
    cache: Arc<MergeCache>,
    rules: RwLock<RuleEngine>,
    validator: Option<SchemaValidator>,
    resolver: RwLock<Option<Arc<dyn ConflictResolver>>>,
    watcher: ChangeWatcher,
}

impl HierarchyManager {
    /// Manager over the conventional level directories
    pub fn new(settings: HierarchySettings) -> HierarchyResult<Self> {
        let store = FileConfigStore::new(PathResolver::new()).with_file_stem(&settings.file_stem);
        Self::with_store(settings, Arc::new(store))
    }

    /// Manager over a custom persistence collaborator
    pub fn with_store(
        settings: HierarchySettings,
        store: Arc<dyn ConfigStore>,
    ) -> HierarchyResult<Self> {
        let validator = if settings.validate_schema {
            Some(SchemaValidator::with_default_schema()?)
        } else {
            None
        };
        let discoverer = Arc::new(HierarchyDiscoverer::new(
            Arc::clone(&store),
            settings.discovery_settings(),
        ));
        let cache = Arc::new(MergeCache::new(settings.cache_ttl()));
        let watcher = ChangeWatcher::new(settings.watcher_settings());

        // On-disk edits invalidate like writes through the manager
        let hook_cache = Arc::clone(&cache);
        let hook_discoverer = Arc::clone(&discoverer);
        watcher.add_subscriber(Arc::new(move |event: &ChangeEvent| -> CallbackResult {
            debug!(path = %event.path.display(), kind = %event.kind, "Configuration file changed");
            hook_cache.clear();
            hook_discoverer.clear_discovery_cache();
            Ok(())
        }));

        Ok(Self {
            settings,
            store,
            discoverer,
            cache,
            rules: RwLock::new(RuleEngine::new()),
            validator,
            resolver: RwLock::new(None),
            watcher,
        })
    }

    pub fn settings(&self) -> &HierarchySettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    /// Merged document for the given levels (all when `None`)
    pub fn get_config(&self, levels: Option<&[ConfigLevel]>) -> HierarchyResult<Value> {
        Ok(self.merged(levels)?.merged.clone())
    }

    /// Value at a dot-path of the merged document, or `default`
    ///
    /// Never fails; merge errors are logged and yield the default.
    pub fn get_config_value(
        &self,
        path: &str,
        default: Value,
        levels: Option<&[ConfigLevel]>,
    ) -> Value {
        match self.merged(levels) {
            Ok(result) => result.get(path).cloned().unwrap_or(default),
            Err(e) => {
                warn!(path = %path, error = %e, "Falling back to default value");
                default
            }
        }
    }

    /// Write one value into a level's document
    ///
    /// Without `create_missing` the level document and every parent of
    /// `path` must already exist.
    pub fn set_config_value(
        &self,
        path: &str,
        value: Value,
        level: ConfigLevel,
        create_missing: bool,
    ) -> HierarchyResult<()> {
        let mut document = match self.store.load_config(level)? {
            Some(raw) => raw.document,
            None if create_missing => json!({}),
            None => return Err(HierarchyError::LevelNotFound(level)),
        };

        set_path(&mut document, path, value, create_missing).map_err(|e| match e {
            ConfigError::InvalidPath { path, message } => {
                HierarchyError::PathNotFound { path, message }
            }
            other => other.into(),
        })?;

        self.store.save_config(level, &document)?;
        self.invalidate();
        info!(level = %level, path = %path, "Configuration value written");
        Ok(())
    }

    /// Delete a level's document, returning whether one existed
    pub fn delete_config_level(&self, level: ConfigLevel) -> HierarchyResult<bool> {
        let deleted = self.store.delete_config(level)?;
        self.invalidate();
        if deleted {
            debug!(level = %level, "Configuration level deleted");
        }
        Ok(deleted)
    }

    /// Restore a level from the backup taken on its last write
    pub fn restore_config_level(&self, level: ConfigLevel) -> HierarchyResult<bool> {
        let restored = self.store.restore_config(level)?;
        self.invalidate();
        if restored {
            debug!(level = %level, "Configuration level restored from backup");
        }
        Ok(restored)
    }

    pub fn discover_configurations(
        &self,
        level: Option<ConfigLevel>,
    ) -> BTreeMap<ConfigLevel, Vec<String>> {
        self.discoverer.discover_configurations(level)
    }

    pub fn get_configuration_conflicts(
        &self,
        levels: Option<&[ConfigLevel]>,
    ) -> HierarchyResult<Vec<Conflict>> {
        Ok(self.merged(levels)?.conflicts.clone())
    }

    /// Merged document, conflicts, sources and strategy in one result
    pub fn get_merge_preview(&self, levels: Option<&[ConfigLevel]>) -> HierarchyResult<MergeResult> {
        Ok(self.merged(levels)?.as_ref().clone())
    }

    /// Merge once with an explicit policy, bypassing the cache
    ///
    /// `resolver` takes precedence over one installed with
    /// [`set_resolver`](Self::set_resolver) for INTERACTIVE merges.
    pub fn resolve_configuration_conflicts(
        &self,
        policy: ResolutionPolicy,
        levels: Option<&[ConfigLevel]>,
        resolver: Option<Arc<dyn ConflictResolver>>,
    ) -> HierarchyResult<MergeResult> {
        let mut engine = self.engine().with_policy(policy);
        if let Some(resolver) = resolver {
            engine = engine.with_resolver(resolver);
        }
        let result = self.discoverer.get_effective_configuration(levels, &engine)?;
        info!(
            policy = %policy,
            conflicts = result.conflicts.len(),
            "Explicit conflict resolution finished"
        );
        Ok(result)
    }

    /// Resolver used when the configured policy is INTERACTIVE
    pub fn set_resolver(&self, resolver: Option<Arc<dyn ConflictResolver>>) {
        *self.resolver.write() = resolver;
        self.cache.clear();
    }

    pub fn add_watcher(&self, callback: ChangeCallback) -> SubscriberId {
        self.watcher.add_subscriber(callback)
    }

    pub fn remove_watcher(&self, id: SubscriberId) -> bool {
        self.watcher.remove_subscriber(id)
    }

    /// Channel receiver for change events, independent of callbacks
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.watcher.subscribe()
    }

    pub fn add_merge_rule(
        &self,
        pattern: &str,
        rule_type: MergeRuleType,
        rule_config: Value,
    ) -> HierarchyResult<()> {
        let rule = MergeRule::new(pattern, rule_type, rule_config)?;
        self.rules.write().add_rule(rule);
        self.cache.clear();
        debug!(pattern = %pattern, rule = %rule_type, "Merge rule added");
        Ok(())
    }

    /// Remove every rule with this pattern, returning how many were removed
    pub fn remove_merge_rule(&self, pattern: &str) -> usize {
        let removed = self.rules.write().remove_rule(pattern);
        if removed > 0 {
            self.cache.clear();
        }
        removed
    }

    pub fn merge_rules(&self) -> Vec<MergeRule> {
        self.rules.read().rules().to_vec()
    }

    pub fn validate_hierarchy(&self) -> Vec<HierarchyIssue> {
        self.discoverer.validate_hierarchy(self.validator.as_ref())
    }

    /// Drop all cached merge results and discovery state
    pub fn clear_cache(&self) -> usize {
        self.discoverer.clear_discovery_cache();
        self.cache.clear()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Watch every resolvable level directory and start the watcher
    pub fn start_watching(&self) -> HierarchyResult<WatchBackendKind> {
        for level in ConfigLevel::all() {
            match self.store.level_dir(level) {
                Ok(dir) => self.watcher.add_path(dir, true)?,
                Err(e) => warn!(level = %level, error = %e, "Level directory not watchable"),
            }
        }
        let backend = self.watcher.start()?;
        info!(backend = %backend, paths = self.watcher.watched_paths().len(), "Watching configuration levels");
        Ok(backend)
    }

    pub fn stop_watching(&self) {
        self.watcher.stop();
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_running()
    }

    /// Scan watched levels now and deliver pending changes
    pub fn force_check(&self) -> Vec<ChangeEvent> {
        self.watcher.force_check()
    }

    fn merged(&self, levels: Option<&[ConfigLevel]>) -> HierarchyResult<Arc<MergeResult>> {
        let key_levels: Vec<ConfigLevel> = match levels {
            Some(levels) => levels.to_vec(),
            None => ConfigLevel::all().to_vec(),
        };
        if let Some(snapshot) = self.cache.get(&key_levels) {
            return Ok(snapshot);
        }

        let generation = self.cache.generation();
        let engine = self.engine();
        let result = Arc::new(
            self.discoverer
                .get_effective_configuration(Some(&key_levels), &engine)?,
        );
        self.cache
            .insert_if_current(&key_levels, Arc::clone(&result), generation);
        Ok(result)
    }

    fn engine(&self) -> MergeEngine {
        let mut engine = MergeEngine::new()
            .with_strategy(self.settings.merge_strategy)
            .with_policy(self.settings.resolution_policy)
            .with_strict_types(self.settings.strict_types)
            .with_rules(self.rules.read().clone());
        if let Some(validator) = &self.validator {
            engine = engine.with_validator(validator.clone());
        }
        if let Some(resolver) = self.resolver.read().as_ref() {
            engine = engine.with_resolver(Arc::clone(resolver));
        }
        engine
    }

    fn invalidate(&self) {
        self.cache.clear();
        self.discoverer.clear_discovery_cache();
    }
}
