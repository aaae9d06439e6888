//! Hierarchy discovery: which levels exist, what they hold, and whether
//! the hierarchy as a whole is healthy
//!
//! Discovery never fails. Unreadable or corrupt documents are skipped and
//! recorded as [`HierarchyIssue`]s.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use stratum_core::{
    sort_by_priority, ConfigLevel, ConfigResult, ConflictType, MergeEngine, MergeResult,
    RawConfig, SchemaValidator,
};
use tracing::{debug, warn};

use crate::store::ConfigStore;

/// Tuning for the discovery cache and health checks
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    /// How long a level's discovered names stay fresh
    pub ttl: Duration,
    /// Interval after which every cached level is re-scanned regardless of TTL
    pub recheck_interval: Duration,
    /// Levels reported as missing by `validate_hierarchy`
    pub required_levels: Vec<ConfigLevel>,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5),
            recheck_interval: Duration::from_secs(60),
            required_levels: vec![ConfigLevel::User],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingLevel,
    LoadFailure,
    Conflict,
    Schema,
}

/// A problem found while discovering or validating the hierarchy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HierarchyIssue {
    pub kind: IssueKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<ConfigLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub message: String,
}

impl HierarchyIssue {
    fn new(kind: IssueKind, level: Option<ConfigLevel>, message: impl Into<String>) -> Self {
        Self {
            kind,
            level,
            path: None,
            message: message.into(),
        }
    }

    fn at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl fmt::Display for HierarchyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(level) = self.level {
            write!(f, "[{}] ", level)?;
        }
        if let Some(path) = &self.path {
            write!(f, "{}: ", path)?;
        }
        f.write_str(&self.message)
    }
}

struct DiscoveryCache {
    entries: HashMap<ConfigLevel, (Instant, Vec<String>)>,
    last_full_check: Instant,
}

impl DiscoveryCache {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            last_full_check: Instant::now(),
        }
    }
}

/// Locates and loads per-level documents through a [`ConfigStore`]
pub struct HierarchyDiscoverer {
    store: Arc<dyn ConfigStore>,
    settings: DiscoverySettings,
    cache: Mutex<DiscoveryCache>,
    last_issues: Mutex<Vec<HierarchyIssue>>,
}

impl HierarchyDiscoverer {
    pub fn new(store: Arc<dyn ConfigStore>, settings: DiscoverySettings) -> Self {
        Self {
            store,
            settings,
            cache: Mutex::new(DiscoveryCache::new()),
            last_issues: Mutex::new(Vec::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    pub fn settings(&self) -> &DiscoverySettings {
        &self.settings
    }

    /// Config names per level; one level when `level` is given, else all
    pub fn discover_configurations(
        &self,
        level: Option<ConfigLevel>,
    ) -> BTreeMap<ConfigLevel, Vec<String>> {
        let levels: Vec<ConfigLevel> = match level {
            Some(level) => vec![level],
            None => ConfigLevel::all().to_vec(),
        };
        levels
            .into_iter()
            .map(|level| (level, self.names_for(level, &mut Vec::new())))
            .collect()
    }

    fn names_for(&self, level: ConfigLevel, issues: &mut Vec<HierarchyIssue>) -> Vec<String> {
        {
            let mut cache = self.cache.lock();
            if cache.last_full_check.elapsed() >= self.settings.recheck_interval {
                debug!("Discovery recheck interval elapsed, clearing cache");
                cache.entries.clear();
                cache.last_full_check = Instant::now();
            }
            if let Some((at, names)) = cache.entries.get(&level) {
                if at.elapsed() < self.settings.ttl {
                    return names.clone();
                }
            }
        }

        let names = match self.store.config_names(level) {
            Ok(names) => names,
            Err(e) => {
                warn!(level = %level, error = %e, "Level discovery failed, skipping");
                issues.push(HierarchyIssue::new(IssueKind::LoadFailure, Some(level), e.to_string()));
                Vec::new()
            }
        };
        self.cache
            .lock()
            .entries
            .insert(level, (Instant::now(), names.clone()));
        names
    }

    pub fn clear_discovery_cache(&self) {
        let mut cache = self.cache.lock();
        cache.entries.clear();
        cache.last_full_check = Instant::now();
    }

    /// Load documents for the given levels (all when `None`), ascending by priority
    ///
    /// `specific_configs` restricts loading to those config names.
    pub fn load_hierarchy(
        &self,
        levels: Option<&[ConfigLevel]>,
        specific_configs: Option<&[String]>,
    ) -> Vec<RawConfig> {
        let mut levels: Vec<ConfigLevel> = match levels {
            Some(levels) => levels.to_vec(),
            None => ConfigLevel::all().to_vec(),
        };
        levels.sort();
        levels.dedup();

        let mut issues = Vec::new();
        let mut configs = Vec::new();
        for level in levels {
            for name in self.names_for(level, &mut issues) {
                if specific_configs.is_some_and(|wanted| !wanted.contains(&name)) {
                    continue;
                }
                match self.store.load_named(level, &name) {
                    Ok(Some(raw)) => configs.push(raw),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(level = %level, config = %name, error = %e, "Skipping unreadable configuration");
                        issues.push(
                            HierarchyIssue::new(IssueKind::LoadFailure, Some(level), e.to_string())
                                .at(name),
                        );
                    }
                }
            }
        }

        sort_by_priority(&mut configs);
        debug!(loaded = configs.len(), issues = issues.len(), "Hierarchy loaded");
        *self.last_issues.lock() = issues;
        configs
    }

    /// Issues recorded by the most recent [`load_hierarchy`](Self::load_hierarchy)
    pub fn last_issues(&self) -> Vec<HierarchyIssue> {
        self.last_issues.lock().clone()
    }

    /// Load and merge the given levels
    pub fn get_effective_configuration(
        &self,
        levels: Option<&[ConfigLevel]>,
        engine: &MergeEngine,
    ) -> ConfigResult<MergeResult> {
        let configs = self.load_hierarchy(levels, None);
        engine.merge(&configs)
    }

    /// Report missing required levels, unreadable documents, schema errors
    /// and value conflicts without failing
    pub fn validate_hierarchy(&self, validator: Option<&SchemaValidator>) -> Vec<HierarchyIssue> {
        let configs = self.load_hierarchy(None, None);
        let mut issues = self.last_issues();

        for level in &self.settings.required_levels {
            if !configs.iter().any(|c| c.level == *level) {
                issues.push(HierarchyIssue::new(
                    IssueKind::MissingLevel,
                    Some(*level),
                    format!("Required {} level configuration is missing", level),
                ));
            }
        }

        if let Some(validator) = validator {
            for raw in &configs {
                if let Err(errors) = validator.validate(&raw.document) {
                    issues.extend(errors.into_iter().map(|message| {
                        HierarchyIssue::new(IssueKind::Schema, Some(raw.level), message)
                            .at(raw.name.clone())
                    }));
                }
            }
        }

        match MergeEngine::new().merge(&configs) {
            Ok(result) => {
                issues.extend(
                    result
                        .conflicts
                        .iter()
                        .filter(|c| c.conflict_type != ConflictType::PolicyViolation)
                        .map(|c| {
                            HierarchyIssue::new(
                                IssueKind::Conflict,
                                None,
                                format!(
                                    "{} conflict between {} and {} (winner: {})",
                                    c.conflict_type,
                                    c.source1,
                                    c.source2,
                                    c.higher_priority_source()
                                ),
                            )
                            .at(c.path.clone())
                        }),
                );
            }
            Err(e) => issues.push(HierarchyIssue::new(IssueKind::Conflict, None, e.to_string())),
        }

        issues
    }
}
