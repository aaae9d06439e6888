//! Per-level persistence of raw configuration documents

use std::path::{Path, PathBuf};

use serde_json::Value;
use stratum_core::{ConfigLevel, RawConfig};
use tracing::{debug, info};

use crate::error::{IoOperation, StorageError, StorageResult};
use crate::loader::ConfigLoader;
use crate::resolver::PathResolver;
use crate::types::{ConfigFormat, BACKUP_SUFFIX, DEFAULT_FILE_STEM};

/// Persistence collaborator for per-level raw documents
///
/// Each level holds one primary document plus any number of additional
/// named documents in the same directory.
pub trait ConfigStore: Send + Sync {
    /// Load the level's primary document, `None` when the level has none
    fn load_config(&self, level: ConfigLevel) -> StorageResult<Option<RawConfig>>;

    /// Load a named document at a level
    fn load_named(&self, level: ConfigLevel, name: &str) -> StorageResult<Option<RawConfig>>;

    /// Write the level's primary document, backing up the previous contents
    fn save_config(&self, level: ConfigLevel, document: &Value) -> StorageResult<()>;

    /// Delete the level's primary document, returning whether one existed
    fn delete_config(&self, level: ConfigLevel) -> StorageResult<bool>;

    /// Levels that currently have a primary document
    fn list_configs(&self) -> StorageResult<Vec<ConfigLevel>>;

    /// Names of all documents at a level, sorted
    fn config_names(&self, level: ConfigLevel) -> StorageResult<Vec<String>>;

    /// Restore the snapshot taken on the previous write or delete
    fn restore_config(&self, level: ConfigLevel) -> StorageResult<bool>;

    /// Directory holding the level's documents
    fn level_dir(&self, level: ConfigLevel) -> StorageResult<PathBuf>;
}

/// File-backed store resolving level directories through a [`PathResolver`]
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    resolver: PathResolver,
    file_stem: String,
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new(PathResolver::new())
    }
}

impl FileConfigStore {
    pub fn new(resolver: PathResolver) -> Self {
        Self {
            resolver,
            file_stem: DEFAULT_FILE_STEM.to_string(),
        }
    }

    /// Use a different file stem for the primary document
    pub fn with_file_stem(mut self, stem: impl Into<String>) -> Self {
        self.file_stem = stem.into();
        self
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn file_stem(&self) -> &str {
        &self.file_stem
    }

    /// Existing file for `name` at a level, probing the supported extensions
    pub fn find_file(&self, level: ConfigLevel, name: &str) -> StorageResult<Option<PathBuf>> {
        let dir = self.resolver.resolve_level_dir(level)?;
        Ok(ConfigFormat::EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("{}.{}", name, ext)))
            .find(|path| path.is_file()))
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(".");
        name.push(BACKUP_SUFFIX);
        path.with_file_name(name)
    }

    fn backup(path: &Path) -> StorageResult<()> {
        let backup = Self::backup_path(path);
        std::fs::copy(path, &backup)
            .map_err(|e| StorageError::io_error(backup.clone(), IoOperation::Copy, e))?;
        debug!(path = %backup.display(), "Backup written");
        Ok(())
    }
}

impl ConfigStore for FileConfigStore {
    fn load_config(&self, level: ConfigLevel) -> StorageResult<Option<RawConfig>> {
        self.load_named(level, &self.file_stem)
    }

    fn load_named(&self, level: ConfigLevel, name: &str) -> StorageResult<Option<RawConfig>> {
        let Some(path) = self.find_file(level, name)? else {
            return Ok(None);
        };
        let document = ConfigLoader::load_from_file(&path).map_err(|e| {
            StorageError::discovery(level, path.clone(), e.to_string())
        })?;
        Ok(Some(RawConfig::new(level, name, document).with_path(path)))
    }

    fn save_config(&self, level: ConfigLevel, document: &Value) -> StorageResult<()> {
        let path = match self.find_file(level, &self.file_stem)? {
            Some(existing) => {
                Self::backup(&existing)?;
                existing
            }
            None => {
                let dir = self.resolver.resolve_level_dir(level)?;
                std::fs::create_dir_all(&dir)
                    .map_err(|e| StorageError::directory_creation_failed(dir.clone(), e))?;
                dir.join(format!("{}.{}", self.file_stem, ConfigFormat::Json.extension()))
            }
        };
        let format = ConfigFormat::from_path(&path).unwrap_or(ConfigFormat::Json);
        ConfigLoader::save_to_file(document, &path, format)?;
        info!(level = %level, path = %path.display(), "Configuration saved");
        Ok(())
    }

    fn delete_config(&self, level: ConfigLevel) -> StorageResult<bool> {
        let Some(path) = self.find_file(level, &self.file_stem)? else {
            return Ok(false);
        };
        Self::backup(&path)?;
        std::fs::remove_file(&path)
            .map_err(|e| StorageError::io_error(path.clone(), IoOperation::Delete, e))?;
        info!(level = %level, path = %path.display(), "Configuration deleted");
        Ok(true)
    }

    fn list_configs(&self) -> StorageResult<Vec<ConfigLevel>> {
        let mut levels = Vec::new();
        for level in ConfigLevel::all() {
            if self.find_file(level, &self.file_stem)?.is_some() {
                levels.push(level);
            }
        }
        Ok(levels)
    }

    fn config_names(&self, level: ConfigLevel) -> StorageResult<Vec<String>> {
        let dir = self.resolver.resolve_level_dir(level)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| StorageError::io_error(dir.clone(), IoOperation::Read, e))?;

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && ConfigFormat::from_path(path).is_some())
            .filter_map(|path| {
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn restore_config(&self, level: ConfigLevel) -> StorageResult<bool> {
        let dir = self.resolver.resolve_level_dir(level)?;
        for ext in ConfigFormat::EXTENSIONS {
            let path = dir.join(format!("{}.{}", self.file_stem, ext));
            let backup = Self::backup_path(&path);
            if !backup.is_file() {
                continue;
            }
            // drop any sibling in another format so the restored file is the one found
            if let Some(current) = self.find_file(level, &self.file_stem)? {
                if current != path {
                    std::fs::remove_file(&current).map_err(|e| {
                        StorageError::io_error(current.clone(), IoOperation::Delete, e)
                    })?;
                }
            }
            std::fs::copy(&backup, &path)
                .map_err(|e| StorageError::io_error(path.clone(), IoOperation::Copy, e))?;
            info!(level = %level, path = %path.display(), "Configuration restored from backup");
            return Ok(true);
        }
        Ok(false)
    }

    fn level_dir(&self, level: ConfigLevel) -> StorageResult<PathBuf> {
        self.resolver.resolve_level_dir(level)
    }
}
