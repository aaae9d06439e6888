//! Snapshot-and-diff change detection

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;

use walkdir::WalkDir;

use super::{ChangeKind, WatchedPath};

/// What the poller remembers about one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileState {
    pub mtime: Option<SystemTime>,
    pub size: u64,
}

impl FileState {
    fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        Self {
            mtime: metadata.modified().ok(),
            size: metadata.len(),
        }
    }

    pub fn read(path: &std::path::Path) -> Option<Self> {
        std::fs::metadata(path)
            .ok()
            .filter(|m| m.is_file())
            .map(|m| Self::from_metadata(&m))
    }
}

/// Current state of every matched file under a watched path
pub fn scan(watched: &WatchedPath) -> HashMap<PathBuf, FileState> {
    let root = &watched.path;
    if root.is_file() {
        return FileState::read(root)
            .filter(|_| watched.matches(root))
            .map(|state| HashMap::from([(root.clone(), state)]))
            .unwrap_or_default();
    }
    if !root.is_dir() {
        return HashMap::new();
    }

    let max_depth = if watched.recursive { usize::MAX } else { 1 };
    WalkDir::new(root)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| watched.matches(entry.path()))
        .filter_map(|entry| {
            entry
                .metadata()
                .ok()
                .map(|m| (entry.path().to_path_buf(), FileState::from_metadata(&m)))
        })
        .collect()
}

/// Classify differences between two snapshots, sorted by path
pub fn diff(
    previous: &HashMap<PathBuf, FileState>,
    current: &HashMap<PathBuf, FileState>,
) -> Vec<(PathBuf, ChangeKind)> {
    let mut changes: Vec<(PathBuf, ChangeKind)> = current
        .iter()
        .filter_map(|(path, state)| match previous.get(path) {
            None => Some((path.clone(), ChangeKind::Created)),
            Some(old) if old != state => Some((path.clone(), ChangeKind::Modified)),
            Some(_) => None,
        })
        .chain(
            previous
                .keys()
                .filter(|path| !current.contains_key(*path))
                .map(|path| (path.clone(), ChangeKind::Deleted)),
        )
        .collect();
    changes.sort();
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scan_respects_patterns_and_depth() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.json"), "{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("deep.yaml"), "a: 1").unwrap();

        let flat = WatchedPath::new(dir.path(), false).unwrap();
        let found = scan(&flat);
        assert_eq!(found.len(), 1);
        assert!(found.contains_key(&dir.path().join("config.json")));

        let recursive = WatchedPath::new(dir.path(), true).unwrap();
        assert_eq!(scan(&recursive).len(), 2);
    }

    #[test]
    fn test_diff_classifies_changes() {
        let state = |size| FileState { mtime: None, size };
        let previous = HashMap::from([
            (PathBuf::from("kept"), state(1)),
            (PathBuf::from("changed"), state(1)),
            (PathBuf::from("gone"), state(1)),
        ]);
        let current = HashMap::from([
            (PathBuf::from("kept"), state(1)),
            (PathBuf::from("changed"), state(2)),
            (PathBuf::from("new"), state(1)),
        ]);
        assert_eq!(
            diff(&previous, &current),
            vec![
                (PathBuf::from("changed"), ChangeKind::Modified),
                (PathBuf::from("gone"), ChangeKind::Deleted),
                (PathBuf::from("new"), ChangeKind::Created),
            ]
        );
    }

    #[test]
    fn test_missing_root_scans_empty() {
        let watched = WatchedPath::new("/nonexistent/stratum/level", true).unwrap();
        assert!(scan(&watched).is_empty());
    }
}
