//! Per-level directory resolution
//!
//! Search order for each level:
//! 1. explicit override set on the resolver
//! 2. `STRATUM_<LEVEL>_CONFIG_DIR` environment variable
//! 3. conventional location (system path, XDG config home, or an upward
//!    walk from the working directory for the project level)

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use stratum_core::ConfigLevel;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::types::PROJECT_MARKER;

const APP_DIR: &str = "stratum";

/// Resolves the directory holding each level's configuration
#[derive(Debug, Clone)]
pub struct PathResolver {
    overrides: HashMap<ConfigLevel, PathBuf>,
    working_dir: Option<PathBuf>,
    /// Levels without an override live under `<root>/<level>`
    root: Option<PathBuf>,
    use_env: bool,
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl PathResolver {
    /// Resolver honoring environment overrides and conventional locations
    pub fn new() -> Self {
        Self {
            overrides: HashMap::new(),
            working_dir: None,
            root: None,
            use_env: true,
        }
    }

    /// Resolver that places every level under `root`, ignoring the environment
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self {
            overrides: HashMap::new(),
            working_dir: None,
            root: Some(root.into()),
            use_env: false,
        }
    }

    pub fn with_override(mut self, level: ConfigLevel, dir: impl Into<PathBuf>) -> Self {
        self.overrides.insert(level, dir.into());
        self
    }

    /// Start the project-level upward walk from `dir` instead of the process cwd
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Directory holding the given level's configuration files
    pub fn resolve_level_dir(&self, level: ConfigLevel) -> StorageResult<PathBuf> {
        if let Some(dir) = self.overrides.get(&level) {
            return Ok(dir.clone());
        }

        if let Some(root) = &self.root {
            return Ok(root.join(level.as_str()));
        }

        if self.use_env {
            if let Ok(value) = std::env::var(level.env_var()) {
                if !value.trim().is_empty() {
                    debug!(level = %level, var = level.env_var(), "Using environment override");
                    return Self::expand_home(Path::new(value.trim()));
                }
            }
        }

        match level {
            ConfigLevel::Enterprise => Ok(Self::system_dir()),
            ConfigLevel::User => Self::user_dir(),
            ConfigLevel::Team => Ok(Self::user_dir()?.join("team")),
            ConfigLevel::Project => {
                let cwd = self.working_dir()?;
                Ok(Self::find_project_root(&cwd)
                    .unwrap_or(cwd)
                    .join(PROJECT_MARKER))
            }
        }
    }

    /// Nearest ancestor of `start` (inclusive) containing the project marker
    pub fn find_project_root(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .find(|dir| dir.join(PROJECT_MARKER).is_dir())
            .map(Path::to_path_buf)
    }

    fn working_dir(&self) -> StorageResult<PathBuf> {
        match &self.working_dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().map_err(|e| {
                StorageError::path_resolution_error(format!(
                    "Could not determine working directory: {}",
                    e
                ))
            }),
        }
    }

    fn system_dir() -> PathBuf {
        if cfg!(windows) {
            let base = std::env::var("PROGRAMDATA").unwrap_or_else(|_| "C:\\ProgramData".into());
            PathBuf::from(base).join(APP_DIR)
        } else {
            PathBuf::from("/etc").join(APP_DIR)
        }
    }

    fn user_dir() -> StorageResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or_else(|| StorageError::path_resolution_error("Could not determine config directory"))
    }

    /// Expand ~ in paths to home directory
    pub fn expand_home(path: &Path) -> StorageResult<PathBuf> {
        let path_str = path
            .to_str()
            .ok_or_else(|| StorageError::path_resolution_error("Invalid path encoding"))?;

        let Some(rest) = path_str.strip_prefix('~') else {
            return Ok(path.to_path_buf());
        };
        let home = dirs::home_dir()
            .ok_or_else(|| StorageError::path_resolution_error("Could not determine home directory"))?;
        let rest = rest.trim_start_matches(['/', '\\']);
        Ok(if rest.is_empty() { home } else { home.join(rest) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_rooted_resolver() {
        let resolver = PathResolver::rooted("/tmp/stratum-root")
            .with_override(ConfigLevel::Team, "/srv/team");
        assert_eq!(
            resolver.resolve_level_dir(ConfigLevel::User).unwrap(),
            PathBuf::from("/tmp/stratum-root/user")
        );
        assert_eq!(
            resolver.resolve_level_dir(ConfigLevel::Team).unwrap(),
            PathBuf::from("/srv/team")
        );
    }

    #[test]
    #[serial]
    fn test_env_override_wins_over_convention() {
        std::env::set_var("STRATUM_USER_CONFIG_DIR", "/tmp/stratum-user");
        let dir = PathResolver::new().resolve_level_dir(ConfigLevel::User).unwrap();
        std::env::remove_var("STRATUM_USER_CONFIG_DIR");
        assert_eq!(dir, PathBuf::from("/tmp/stratum-user"));
    }

    #[test]
    #[serial]
    fn test_project_walks_upward_to_marker() {
        std::env::remove_var("STRATUM_PROJECT_CONFIG_DIR");
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join(PROJECT_MARKER)).unwrap();
        let nested = root.path().join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();

        let dir = PathResolver::new()
            .with_working_dir(&nested)
            .resolve_level_dir(ConfigLevel::Project)
            .unwrap();
        assert_eq!(dir, root.path().join(PROJECT_MARKER));
    }

    #[test]
    fn test_expand_home() {
        let expanded = PathResolver::expand_home(Path::new("~/.stratum")).unwrap();
        assert!(!expanded.to_string_lossy().contains('~'));
        let plain = PathResolver::expand_home(Path::new("/etc/stratum")).unwrap();
        assert_eq!(plain, PathBuf::from("/etc/stratum"));
    }
}
