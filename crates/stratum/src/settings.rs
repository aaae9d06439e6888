//! Settings of the hierarchy itself
//!
//! Defaults come from [`HierarchySettings::default`], optionally replaced by
//! a settings file and then overridden by `STRATUM_*` environment variables.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stratum_core::{ConfigLevel, MergeStrategy, ResolutionPolicy};
use stratum_storage::{
    ConfigLoader, DiscoverySettings, WatchBackendKind, WatcherSettings, DEFAULT_FILE_STEM,
};
use tracing::{debug, warn};

use crate::error::{HierarchyError, HierarchyResult};

const ENV_PREFIX: &str = "STRATUM_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchySettings {
    /// Lifetime of a cached merge result
    pub cache_ttl_secs: u64,
    /// Lifetime of discovered config names per level
    pub discovery_ttl_secs: u64,
    /// Full discovery re-scan interval
    pub recheck_interval_secs: u64,
    pub required_levels: Vec<ConfigLevel>,
    pub merge_strategy: MergeStrategy,
    pub resolution_policy: ResolutionPolicy,
    /// Abort merges on TYPE conflicts instead of resolving them
    pub strict_types: bool,
    /// Validate merged results against the default schema
    pub validate_schema: bool,
    pub file_stem: String,
    pub poll_interval_ms: u64,
    pub debounce_ms: u64,
    pub watch_backend: WatchBackendKind,
}

impl Default for HierarchySettings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            discovery_ttl_secs: 5,
            recheck_interval_secs: 60,
            required_levels: vec![ConfigLevel::User],
            merge_strategy: MergeStrategy::Deep,
            resolution_policy: ResolutionPolicy::HigherPriority,
            strict_types: false,
            validate_schema: true,
            file_stem: DEFAULT_FILE_STEM.to_string(),
            poll_interval_ms: 1000,
            debounce_ms: 500,
            watch_backend: WatchBackendKind::Auto,
        }
    }
}

impl HierarchySettings {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        settings.apply_env_overrides();
        settings
    }

    /// Load settings from a JSON, YAML or TOML file; missing keys take defaults
    pub fn load_from_file(path: impl AsRef<Path>) -> HierarchyResult<Self> {
        let path = path.as_ref();
        let document = ConfigLoader::load_from_file(path)?;
        serde_json::from_value(document)
            .map_err(|e| HierarchyError::invalid_setting(path.display().to_string(), e.to_string()))
    }

    /// Apply every `STRATUM_*` variable from the process environment
    pub fn apply_env_overrides(&mut self) {
        let overrides: HashMap<String, String> = std::env::vars()
            .filter_map(|(key, value)| {
                key.strip_prefix(ENV_PREFIX)
                    .map(|name| (name.to_lowercase(), value))
            })
            .collect();
        self.apply_overrides(&overrides);
    }

    /// Apply overrides keyed by lowercase setting name, e.g. `cache_ttl`
    ///
    /// Unknown names are ignored, unparsable values are logged and skipped.
    pub fn apply_overrides(&mut self, overrides: &HashMap<String, String>) {
        for (name, value) in overrides {
            let value = value.trim();
            let applied = match name.as_str() {
                "cache_ttl" => parse_into(value, &mut self.cache_ttl_secs),
                "discovery_ttl" => parse_into(value, &mut self.discovery_ttl_secs),
                "recheck_interval" => parse_into(value, &mut self.recheck_interval_secs),
                "merge_strategy" => parse_into(value, &mut self.merge_strategy),
                "resolution_policy" => parse_into(value, &mut self.resolution_policy),
                "strict_types" => parse_into(value, &mut self.strict_types),
                "validate_schema" => parse_into(value, &mut self.validate_schema),
                "poll_interval_ms" => parse_into(value, &mut self.poll_interval_ms),
                "debounce_ms" => parse_into(value, &mut self.debounce_ms),
                "watch_backend" => parse_into(value, &mut self.watch_backend),
                "file_stem" if !value.is_empty() => {
                    self.file_stem = value.to_string();
                    true
                }
                "required_levels" => {
                    let levels: Result<Vec<ConfigLevel>, _> = value
                        .split(',')
                        .filter(|s| !s.trim().is_empty())
                        .map(str::parse)
                        .collect();
                    match levels {
                        Ok(levels) => {
                            self.required_levels = levels;
                            true
                        }
                        Err(_) => false,
                    }
                }
                _ => continue,
            };
            if applied {
                debug!(setting = %name, value = %value, "Setting overridden from environment");
            } else {
                warn!(setting = %name, value = %value, "Ignoring invalid environment override");
            }
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn discovery_settings(&self) -> DiscoverySettings {
        DiscoverySettings {
            ttl: Duration::from_secs(self.discovery_ttl_secs),
            recheck_interval: Duration::from_secs(self.recheck_interval_secs),
            required_levels: self.required_levels.clone(),
        }
    }

    pub fn watcher_settings(&self) -> WatcherSettings {
        WatcherSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            debounce: Duration::from_millis(self.debounce_ms),
            backend: self.watch_backend,
        }
    }
}

fn parse_into<T: std::str::FromStr>(value: &str, slot: &mut T) -> bool {
    match value.parse() {
        Ok(parsed) => {
            *slot = parsed;
            true
        }
        Err(_) => false,
    }
}
