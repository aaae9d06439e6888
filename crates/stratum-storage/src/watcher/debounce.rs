//! Per-path debouncing of file change events
//!
//! Repeated events for one path are coalesced and released once that path
//! has been quiet for the whole window. Other paths are unaffected.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use super::ChangeKind;

#[derive(Debug, Clone)]
struct Pending {
    kind: ChangeKind,
    last_seen: Instant,
}

/// Accumulates change events until each path goes quiet
#[derive(Debug)]
pub struct DebounceBuffer {
    pending: HashMap<PathBuf, Pending>,
    window: Duration,
}

impl DebounceBuffer {
    pub fn new(window: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record an event seen at `now`, coalescing with a pending one for the same path
    pub fn collect_event(&mut self, path: PathBuf, kind: ChangeKind, now: Instant) {
        match self.pending.get_mut(&path) {
            Some(pending) => match coalesce(pending.kind, kind) {
                Some(merged) => {
                    pending.kind = merged;
                    pending.last_seen = now;
                }
                None => {
                    self.pending.remove(&path);
                }
            },
            None => {
                self.pending.insert(
                    path,
                    Pending {
                        kind,
                        last_seen: now,
                    },
                );
            }
        }
    }

    /// Remove and return every event whose path has been quiet for the window
    pub fn take_ready(&mut self, now: Instant) -> Vec<(PathBuf, ChangeKind)> {
        let window = self.window;
        let ready: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.last_seen) >= window)
            .map(|(path, _)| path.clone())
            .collect();

        let mut events: Vec<(PathBuf, ChangeKind)> = ready
            .into_iter()
            .filter_map(|path| self.pending.remove(&path).map(|p| (path, p.kind)))
            .collect();
        events.sort();
        events
    }

    /// Remove and return everything pending, quiet or not
    pub fn take_all(&mut self) -> Vec<(PathBuf, ChangeKind)> {
        let mut events: Vec<(PathBuf, ChangeKind)> =
            self.pending.drain().map(|(path, p)| (path, p.kind)).collect();
        events.sort();
        events
    }

    /// Time until the earliest pending path becomes ready
    pub fn next_deadline(&self, now: Instant) -> Option<Duration> {
        self.pending
            .values()
            .map(|p| (p.last_seen + self.window).saturating_duration_since(now))
            .min()
    }

    pub fn event_count(&self) -> usize {
        self.pending.len()
    }

    pub fn has_events(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Combined kind for two events on one path; `None` when they cancel out
fn coalesce(earlier: ChangeKind, later: ChangeKind) -> Option<ChangeKind> {
    use ChangeKind::*;
    match (earlier, later) {
        (Created, Deleted) => None,
        (Created, _) => Some(Created),
        (Deleted, Created) | (Deleted, Modified) => Some(Modified),
        (_, later) => Some(later),
    }
}
