//! TTL cache of merge results keyed by requested level set
//!
//! Writes never try to work out which keys they affect; any write clears
//! the whole cache. Each clear bumps a generation counter, and a snapshot
//! computed under an older generation is never stored.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use stratum_core::{level_key, ConfigLevel, MergeResult};
use tracing::debug;

/// A cached merge snapshot
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub snapshot: Arc<MergeResult>,
    pub created_at: Instant,
    pub ttl: Duration,
    size_bytes: usize,
}

impl CacheEntry {
    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.ttl
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Diagnostics for the merge cache
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    /// Approximate, from the serialized merged documents
    pub total_size_bytes: usize,
    pub oldest_age_secs: Option<f64>,
    pub newest_age_secs: Option<f64>,
    pub hits: u64,
    pub misses: u64,
}

pub struct MergeCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MergeCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh snapshot for the level set, evicting it if expired
    pub fn get(&self, levels: &[ConfigLevel]) -> Option<Arc<MergeResult>> {
        let key = level_key(levels);
        {
            let entries = self.entries.read();
            match entries.get(&key) {
                Some(entry) if !entry.is_expired() => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, "Merge cache hit");
                    return Some(Arc::clone(&entry.snapshot));
                }
                Some(_) => {}
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, "Merge cache miss");
                    return None;
                }
            }
        }

        self.entries.write().remove(&key);
        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "Merge cache entry expired");
        None
    }

    /// Current generation; read it before computing a snapshot to insert
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn insert(&self, levels: &[ConfigLevel], snapshot: Arc<MergeResult>) {
        let entry = self.entry(levels, snapshot);
        self.entries.write().insert(entry.key.clone(), entry);
    }

    /// Store the snapshot only if no clear happened since `generation`
    ///
    /// Returns whether the snapshot was stored.
    pub fn insert_if_current(
        &self,
        levels: &[ConfigLevel],
        snapshot: Arc<MergeResult>,
        generation: u64,
    ) -> bool {
        let entry = self.entry(levels, snapshot);
        let mut entries = self.entries.write();
        // clear() bumps the generation while holding this lock
        if self.generation.load(Ordering::Acquire) != generation {
            debug!(key = %entry.key, "Discarding merge computed before a clear");
            return false;
        }
        entries.insert(entry.key.clone(), entry);
        true
    }

    fn entry(&self, levels: &[ConfigLevel], snapshot: Arc<MergeResult>) -> CacheEntry {
        let size_bytes = serde_json::to_string(&snapshot.merged)
            .map(|s| s.len())
            .unwrap_or(0);
        CacheEntry {
            key: level_key(levels),
            snapshot,
            created_at: Instant::now(),
            ttl: self.ttl,
            size_bytes,
        }
    }

    /// Drop every entry, returning how many were dropped
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        let count = entries.len();
        entries.clear();
        if count > 0 {
            debug!(entries = count, "Merge cache cleared");
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read();
        let ages: Vec<Duration> = entries.values().map(CacheEntry::age).collect();
        CacheStats {
            entries: entries.len(),
            total_size_bytes: entries.values().map(|e| e.size_bytes).sum(),
            oldest_age_secs: ages.iter().max().map(Duration::as_secs_f64),
            newest_age_secs: ages.iter().min().map(Duration::as_secs_f64),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stratum_core::{MergeStrategy, ResolutionPolicy};

    fn snapshot(value: serde_json::Value) -> Arc<MergeResult> {
        Arc::new(MergeResult {
            merged: value,
            conflicts: Vec::new(),
            sources: vec!["user".to_string()],
            strategy: MergeStrategy::Deep,
            policy: ResolutionPolicy::HigherPriority,
            fell_back: false,
        })
    }

    #[test]
    fn test_key_ignores_level_order() {
        let cache = MergeCache::new(Duration::from_secs(60));
        cache.insert(&[ConfigLevel::User, ConfigLevel::Team], snapshot(json!({"a": 1})));
        let hit = cache.get(&[ConfigLevel::Team, ConfigLevel::User]).unwrap();
        assert_eq!(hit.merged, json!({"a": 1}));
        assert!(cache.get(&[ConfigLevel::User]).is_none());
    }

    #[test]
    fn test_expired_entries_are_evicted() {
        let cache = MergeCache::new(Duration::ZERO);
        cache.insert(&[ConfigLevel::User], snapshot(json!({})));
        assert!(cache.get(&[ConfigLevel::User]).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear_and_stats() {
        let cache = MergeCache::new(Duration::from_secs(60));
        cache.insert(&[ConfigLevel::User], snapshot(json!({"k": "v"})));
        cache.insert(&[ConfigLevel::Project], snapshot(json!({})));
        cache.get(&[ConfigLevel::User]);
        cache.get(&[ConfigLevel::Enterprise]);

        let stats = cache.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.total_size_bytes, r#"{"k":"v"}"#.len() + 2);
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert!(stats.oldest_age_secs >= stats.newest_age_secs);

        assert_eq!(cache.clear(), 2);
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_snapshot_from_before_clear_is_discarded() {
        let cache = MergeCache::new(Duration::from_secs(60));
        let generation = cache.generation();
        cache.clear();

        assert!(!cache.insert_if_current(&[ConfigLevel::User], snapshot(json!({"v": "old"})), generation));
        assert!(cache.get(&[ConfigLevel::User]).is_none());

        let generation = cache.generation();
        assert!(cache.insert_if_current(&[ConfigLevel::User], snapshot(json!({"v": "new"})), generation));
        assert_eq!(cache.get(&[ConfigLevel::User]).unwrap().merged, json!({"v": "new"}));
    }
}
