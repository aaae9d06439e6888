//! Change watching for configuration directories
//!
//! A background thread collects file changes from either native OS events
//! or a polling loop, debounces them per path, and delivers each surviving
//! change to registered callbacks and to broadcast subscribers.

pub mod debounce;
pub mod native;
pub mod polling;

pub use debounce::DebounceBuffer;
pub use polling::FileState;

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};

/// File name patterns watched when none are given
pub const DEFAULT_FILE_PATTERNS: [&str; 4] = ["*.json", "*.yaml", "*.yml", "*.toml"];

const MAX_IDLE_WAIT: Duration = Duration::from_millis(100);
const CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Created => f.write_str("created"),
            ChangeKind::Modified => f.write_str("modified"),
            ChangeKind::Deleted => f.write_str("deleted"),
        }
    }
}

/// A debounced change to one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub detected_at: DateTime<Utc>,
}

/// Which event source feeds the watcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchBackendKind {
    /// Native events when every root exists, polling otherwise
    #[default]
    Auto,
    Native,
    Polling,
}

impl fmt::Display for WatchBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchBackendKind::Auto => f.write_str("auto"),
            WatchBackendKind::Native => f.write_str("native"),
            WatchBackendKind::Polling => f.write_str("polling"),
        }
    }
}

impl FromStr for WatchBackendKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(WatchBackendKind::Auto),
            "native" => Ok(WatchBackendKind::Native),
            "polling" | "poll" => Ok(WatchBackendKind::Polling),
            other => Err(StorageError::WatchBackend(format!(
                "unknown watch backend '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatcherSettings {
    pub poll_interval: Duration,
    pub debounce: Duration,
    pub backend: WatchBackendKind,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            debounce: Duration::from_millis(500),
            backend: WatchBackendKind::Auto,
        }
    }
}

/// A root being watched and the last state seen beneath it
#[derive(Debug, Clone)]
pub struct WatchedPath {
    pub path: PathBuf,
    pub recursive: bool,
    pub file_patterns: Vec<String>,
    pub last_known_state: HashMap<PathBuf, FileState>,
    compiled: Vec<glob::Pattern>,
}

impl WatchedPath {
    /// Watch `path` for the default structured-data file patterns
    pub fn new(path: impl Into<PathBuf>, recursive: bool) -> StorageResult<Self> {
        let patterns: Vec<String> = DEFAULT_FILE_PATTERNS.iter().map(|p| p.to_string()).collect();
        Self::with_patterns(path, recursive, patterns)
    }

    /// Watch `path` for files whose names match any of `patterns`; empty matches all
    pub fn with_patterns(
        path: impl Into<PathBuf>,
        recursive: bool,
        patterns: Vec<String>,
    ) -> StorageResult<Self> {
        let compiled = patterns
            .iter()
            .map(|p| {
                glob::Pattern::new(p).map_err(|e| {
                    StorageError::internal(format!("Invalid file pattern '{}': {}", p, e))
                })
            })
            .collect::<StorageResult<Vec<_>>>()?;
        Ok(Self {
            path: path.into(),
            recursive,
            file_patterns: patterns,
            last_known_state: HashMap::new(),
            compiled,
        })
    }

    /// Whether a file's name matches the patterns
    pub fn matches(&self, file: &Path) -> bool {
        if self.compiled.is_empty() {
            return true;
        }
        let Some(name) = file.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        self.compiled.iter().any(|p| p.matches(name))
    }

    /// Whether `file` lies under this root and matches the patterns
    pub fn covers(&self, file: &Path) -> bool {
        let inside = if file == self.path {
            true
        } else if self.recursive {
            file.starts_with(&self.path)
        } else {
            file.parent() == Some(self.path.as_path())
        };
        inside && self.matches(file)
    }

    fn refresh(&mut self) -> Vec<(PathBuf, ChangeKind)> {
        let current = polling::scan(self);
        let changes = polling::diff(&self.last_known_state, &current);
        self.last_known_state = current;
        changes
    }
}

pub type CallbackResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Callback invoked on the watcher thread for every change
pub type ChangeCallback = Arc<dyn Fn(&ChangeEvent) -> CallbackResult + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

struct Shared {
    paths: Mutex<Vec<WatchedPath>>,
    subscribers: Mutex<Vec<(SubscriberId, ChangeCallback)>>,
    debounce: Mutex<DebounceBuffer>,
    sender: broadcast::Sender<ChangeEvent>,
    next_id: AtomicU64,
}

impl Shared {
    /// Rescan every root, swapping each snapshot in one step
    fn poll(&self) -> Vec<(PathBuf, ChangeKind)> {
        let mut paths = self.paths.lock();
        paths.iter_mut().flat_map(WatchedPath::refresh).collect()
    }

    fn ingest_native(&self, event: &notify::Event) {
        let now = Instant::now();
        let mut paths = self.paths.lock();
        let mut debounce = self.debounce.lock();
        for (file, kind) in native::translate(event) {
            let Some(watched) = paths.iter_mut().find(|w| w.covers(&file)) else {
                continue;
            };
            match kind {
                ChangeKind::Deleted => {
                    // only files seen before; directories never enter the snapshot
                    if watched.last_known_state.remove(&file).is_none() {
                        continue;
                    }
                }
                ChangeKind::Created | ChangeKind::Modified => {
                    let Some(state) = FileState::read(&file) else {
                        continue;
                    };
                    watched.last_known_state.insert(file.clone(), state);
                }
            }
            debounce.collect_event(file, kind, now);
        }
    }

    fn collect(&self, changes: Vec<(PathBuf, ChangeKind)>) {
        if changes.is_empty() {
            return;
        }
        let now = Instant::now();
        let mut debounce = self.debounce.lock();
        for (path, kind) in changes {
            debounce.collect_event(path, kind, now);
        }
    }

    fn dispatch(&self, changes: Vec<(PathBuf, ChangeKind)>) -> Vec<ChangeEvent> {
        if changes.is_empty() {
            return Vec::new();
        }
        let subscribers: Vec<(SubscriberId, ChangeCallback)> = self.subscribers.lock().clone();
        let mut failed = Vec::new();
        let mut events = Vec::with_capacity(changes.len());

        for (path, kind) in changes {
            let event = ChangeEvent {
                path,
                kind,
                detected_at: Utc::now(),
            };
            debug!(path = %event.path.display(), kind = %event.kind, "Configuration file changed");
            // no receivers is fine
            let _ = self.sender.send(event.clone());

            for (id, callback) in &subscribers {
                if failed.contains(id) {
                    continue;
                }
                match catch_unwind(AssertUnwindSafe(|| callback(&event))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(subscriber = id.0, error = %e, "Watch callback failed, unregistering");
                        failed.push(*id);
                    }
                    Err(_) => {
                        warn!(subscriber = id.0, "Watch callback panicked, unregistering");
                        failed.push(*id);
                    }
                }
            }
            events.push(event);
        }

        if !failed.is_empty() {
            self.subscribers.lock().retain(|(id, _)| !failed.contains(id));
        }
        events
    }
}

enum WorkerMsg {
    Native(notify::Result<notify::Event>),
    Stop,
}

struct Worker {
    control: mpsc::Sender<WorkerMsg>,
    handle: JoinHandle<()>,
    backend: WatchBackendKind,
    native: Option<RecommendedWatcher>,
}

/// Watches configuration roots and notifies subscribers of file changes
pub struct ChangeWatcher {
    settings: WatcherSettings,
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl ChangeWatcher {
    pub fn new(settings: WatcherSettings) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let shared = Shared {
            paths: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
            debounce: Mutex::new(DebounceBuffer::new(settings.debounce)),
            sender,
            next_id: AtomicU64::new(1),
        };
        Self {
            settings,
            shared: Arc::new(shared),
            worker: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &WatcherSettings {
        &self.settings
    }

    /// Start watching a root with the default file patterns
    pub fn add_path(&self, path: impl Into<PathBuf>, recursive: bool) -> StorageResult<()> {
        self.add_watched_path(WatchedPath::new(path, recursive)?)
    }

    /// Start watching a root; its current files become the baseline snapshot
    pub fn add_watched_path(&self, mut watched: WatchedPath) -> StorageResult<()> {
        watched.last_known_state = polling::scan(&watched);

        if let Some(worker) = self.worker.lock().as_mut() {
            if let Some(native) = worker.native.as_mut() {
                native.watch(&watched.path, recursive_mode(watched.recursive))?;
            }
        }

        let mut paths = self.shared.paths.lock();
        paths.retain(|w| w.path != watched.path);
        debug!(path = %watched.path.display(), files = watched.last_known_state.len(), "Watching path");
        paths.push(watched);
        Ok(())
    }

    pub fn remove_path(&self, path: &Path) -> bool {
        if let Some(worker) = self.worker.lock().as_mut() {
            if let Some(native) = worker.native.as_mut() {
                let _ = native.unwatch(path);
            }
        }
        let mut paths = self.shared.paths.lock();
        let before = paths.len();
        paths.retain(|w| w.path != path);
        before != paths.len()
    }

    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.shared.paths.lock().iter().map(|w| w.path.clone()).collect()
    }

    /// Register a callback run on the watcher thread for every change
    ///
    /// A callback that returns an error or panics is unregistered.
    pub fn add_subscriber(&self, callback: ChangeCallback) -> SubscriberId {
        let id = SubscriberId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        self.shared.subscribers.lock().push((id, callback));
        id
    }

    pub fn remove_subscriber(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.shared.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        before != subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.lock().len()
    }

    /// Channel receiving every delivered change
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.shared.sender.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Backend in use while running
    pub fn active_backend(&self) -> Option<WatchBackendKind> {
        self.worker.lock().as_ref().map(|w| w.backend)
    }

    /// Spawn the watcher thread, returning the backend actually used
    pub fn start(&self) -> StorageResult<WatchBackendKind> {
        let mut slot = self.worker.lock();
        if let Some(worker) = slot.as_ref() {
            return Ok(worker.backend);
        }

        let (control, rx) = mpsc::channel();
        let native = match self.settings.backend {
            WatchBackendKind::Polling => None,
            WatchBackendKind::Native => Some(self.native_watcher(control.clone())?),
            WatchBackendKind::Auto => {
                let all_exist = self.shared.paths.lock().iter().all(|w| w.path.exists());
                if all_exist {
                    match self.native_watcher(control.clone()) {
                        Ok(watcher) => Some(watcher),
                        Err(e) => {
                            warn!(error = %e, "Native file events unavailable, falling back to polling");
                            None
                        }
                    }
                } else {
                    debug!("Some watch roots do not exist yet, using polling");
                    None
                }
            }
        };
        let backend = if native.is_some() {
            WatchBackendKind::Native
        } else {
            WatchBackendKind::Polling
        };
        let poll_interval = (backend == WatchBackendKind::Polling).then_some(self.settings.poll_interval);

        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("stratum-watcher".to_string())
            .spawn(move || run_worker(shared, rx, poll_interval))
            .map_err(|e| StorageError::WatchBackend(format!("Failed to spawn watcher thread: {}", e)))?;

        info!(backend = %backend, paths = self.shared.paths.lock().len(), "Change watcher started");
        *slot = Some(Worker {
            control,
            handle,
            backend,
            native,
        });
        Ok(backend)
    }

    fn native_watcher(&self, control: mpsc::Sender<WorkerMsg>) -> StorageResult<RecommendedWatcher> {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let _ = control.send(WorkerMsg::Native(res));
        })?;
        for watched in self.shared.paths.lock().iter() {
            watcher.watch(&watched.path, recursive_mode(watched.recursive))?;
        }
        Ok(watcher)
    }

    /// Stop the watcher thread and wait for it to exit
    pub fn stop(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        drop(worker.native);
        let _ = worker.control.send(WorkerMsg::Stop);
        if worker.handle.join().is_err() {
            warn!("Watcher thread panicked");
        }
        let dropped = self.shared.debounce.lock().take_all().len();
        info!(pending_dropped = dropped, "Change watcher stopped");
    }

    /// Scan every root now and deliver all pending changes without waiting
    /// for the debounce window
    pub fn force_check(&self) -> Vec<ChangeEvent> {
        let changes = self.shared.poll();
        self.shared.collect(changes);
        let pending = self.shared.debounce.lock().take_all();
        self.shared.dispatch(pending)
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn recursive_mode(recursive: bool) -> RecursiveMode {
    if recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    }
}

fn run_worker(shared: Arc<Shared>, rx: mpsc::Receiver<WorkerMsg>, poll_interval: Option<Duration>) {
    let mut next_poll = poll_interval.map(|interval| Instant::now() + interval);

    loop {
        let now = Instant::now();
        let mut wait = MAX_IDLE_WAIT;
        if let Some(at) = next_poll {
            wait = wait.min(at.saturating_duration_since(now));
        }
        if let Some(deadline) = shared.debounce.lock().next_deadline(now) {
            wait = wait.min(deadline);
        }

        match rx.recv_timeout(wait.max(Duration::from_millis(1))) {
            Ok(WorkerMsg::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(WorkerMsg::Native(Ok(event))) => shared.ingest_native(&event),
            Ok(WorkerMsg::Native(Err(e))) => warn!(error = %e, "File watching error"),
            Err(RecvTimeoutError::Timeout) => {}
        }

        if let (Some(at), Some(interval)) = (next_poll, poll_interval) {
            if Instant::now() >= at {
                let changes = shared.poll();
                shared.collect(changes);
                next_poll = Some(Instant::now() + interval);
            }
        }

        let ready = shared.debounce.lock().take_ready(Instant::now());
        shared.dispatch(ready);
    }
}
