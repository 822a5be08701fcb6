// src/cache/mod.rs
//! Disk-backed response cache with TTL expiry and a byte budget.
//!
//! - Two layers: an in-memory map (hot) and one JSON file per entry (`{key}.cache`).
//! - `cache_index.json` summarizes key → (created_at, ttl, url, size); warm start
//!   loads the union of indexed keys and entry files found on disk.
//!   It is rewritten every 10th write, when 60 s have passed since the last flush,
//!   on `flush()`/`optimize()`, and on drop.
//! - Over budget: evict oldest-by-creation first (not LRU by access).
//! - Every disk failure is swallowed (debug log); the cache never fails a crawl.

mod entry;
pub mod rate_limit;

pub use entry::{cache_key, CacheEntry, Headers};
pub use rate_limit::{RateLimitCache, RateLimitRecord};

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::config::CrawlerConfig;
use crate::telemetry::describe_metrics;
use entry::{entry_path, index_path, read_entry, read_index, scan_entry_keys, write_entry, write_index, IndexRecord};

const INDEX_FLUSH_EVERY_WRITES: u64 = 10;
const INDEX_FLUSH_INTERVAL_SECS: i64 = 60;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Snapshot of cache counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses) * 100`, rounded to 2 decimals; 0 with no lookups.
    pub hit_rate_percent: f64,
    /// Budget evictions only.
    pub evictions: u64,
    /// TTL purges (lazy and swept).
    pub expired: u64,
    pub entries: usize,
    pub size_bytes: u64,
    pub max_size_bytes: u64,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

impl CacheStats {
    pub fn size_mb(&self) -> f64 {
        round2(self.size_bytes as f64 / BYTES_PER_MB)
    }

    pub fn max_size_mb(&self) -> f64 {
        round2(self.max_size_bytes as f64 / BYTES_PER_MB)
    }

    /// Tuning hints derived from the counters.
    pub fn recommendations(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.hit_rate_percent < 30.0 {
            out.push("Low cache hit rate - consider increasing TTL or cache size".to_string());
        }
        if self.evictions as f64 > self.hits as f64 * 0.5 {
            out.push("High eviction rate - consider increasing cache size".to_string());
        }
        if self.size_bytes as f64 > self.max_size_bytes as f64 * 0.9 {
            out.push("Cache nearly full - consider clearing expired entries".to_string());
        }
        out
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    size_bytes: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    expired: u64,
    writes: u64,
    last_index_flush: Option<DateTime<Utc>>,
}

/// Thread-safe response cache; share one instance through `Arc`.
pub struct ResponseCache {
    dir: PathBuf,
    max_size_bytes: u64,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("dir", &self.dir)
            .field("max_size_bytes", &self.max_size_bytes)
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

impl ResponseCache {
    pub fn new(dir: impl Into<PathBuf>, max_size_bytes: u64, default_ttl: Duration) -> Self {
        Self::with_clock(dir, max_size_bytes, default_ttl, Arc::new(SystemClock))
    }

    /// Open (or create) a cache directory and warm-start from whatever it holds.
    pub fn with_clock(
        dir: impl Into<PathBuf>,
        max_size_bytes: u64,
        default_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        describe_metrics();
        let dir = dir.into();
        if let Err(e) = fs::create_dir_all(&dir) {
            debug!(target: "cache", dir = %dir.display(), error = %e, "cache dir not creatable; running memory-only");
        }
        let cache = Self {
            dir,
            max_size_bytes,
            default_ttl,
            clock,
            inner: Mutex::new(Inner::default()),
        };
        cache.load();
        cache
    }

    pub fn from_config(cfg: &CrawlerConfig) -> Self {
        Self::new(
            cfg.cache_dir.clone(),
            cfg.max_cache_size_bytes(),
            cfg.cache_ttl(),
        )
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /* ----------------------------
    Lookup / insert
    ---------------------------- */

    pub fn get(&self, url: &str, headers: &Headers) -> Option<String> {
        let key = cache_key(url, headers);
        let now = self.clock.now();
        let mut g = self.lock();

        if let Some(e) = g.entries.get(&key) {
            if !e.is_expired(now) {
                let content = e.content.clone();
                g.hits += 1;
                counter!("cache_hits_total").increment(1);
                return Some(content);
            }
            self.purge_expired_locked(&mut g, &key);
        }

        // Disk layer: entries written by another instance or missed by the index.
        let path = entry_path(&self.dir, &key);
        match read_entry(&path) {
            Ok(e) if e.key() == key && !e.is_expired(now) => {
                let content = e.content.clone();
                self.admit_locked(&mut g, key, e);
                g.hits += 1;
                counter!("cache_hits_total").increment(1);
                return Some(content);
            }
            Ok(e) if e.is_expired(now) => {
                remove_file_quiet(&path);
                g.expired += 1;
                counter!("cache_expired_total").increment(1);
            }
            Ok(_) => {
                debug!(target: "cache", path = %path.display(), "entry key mismatch; removing");
                remove_file_quiet(&path);
            }
            Err(_) => {}
        }

        g.misses += 1;
        counter!("cache_misses_total").increment(1);
        None
    }

    /// Store `content`; `ttl = None` uses the default TTL. Empty content is ignored.
    pub fn set(&self, url: &str, content: &str, headers: &Headers, ttl: Option<Duration>) {
        if content.is_empty() {
            return;
        }
        let key = cache_key(url, headers);
        let now = self.clock.now();
        let entry = CacheEntry::new(url, content, headers, ttl.unwrap_or(self.default_ttl), now);

        let mut g = self.lock();
        if let Some(old) = g.entries.remove(&key) {
            g.size_bytes = g.size_bytes.saturating_sub(old.size_bytes);
        }

        if entry.size_bytes > self.max_size_bytes {
            debug!(target: "cache", url, size = entry.size_bytes, max = self.max_size_bytes, "entry larger than whole budget; not cached");
            remove_file_quiet(&entry_path(&self.dir, &key));
            gauge!("cache_size_bytes").set(g.size_bytes as f64);
            return;
        }

        self.make_room_locked(&mut g, entry.size_bytes);
        if let Err(e) = write_entry(&self.dir, &key, &entry) {
            debug!(target: "cache", url, error = %e, "cache write failed; memory only");
        }
        g.size_bytes += entry.size_bytes;
        g.entries.insert(key, entry);
        g.writes += 1;
        gauge!("cache_size_bytes").set(g.size_bytes as f64);

        let interval_passed = g
            .last_index_flush
            .map(|t| (now - t).num_seconds() > INDEX_FLUSH_INTERVAL_SECS)
            .unwrap_or(true);
        if g.writes % INDEX_FLUSH_EVERY_WRITES == 0 || interval_passed {
            self.flush_locked(&mut g, now);
        }
    }

    /* ----------------------------
    Maintenance
    ---------------------------- */

    /// Purge every expired entry; returns how many were removed.
    pub fn clear_expired(&self) -> usize {
        let now = self.clock.now();
        let mut g = self.lock();
        let keys: Vec<String> = g
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for k in &keys {
            self.purge_expired_locked(&mut g, k);
        }
        if !keys.is_empty() {
            debug!(target: "cache", removed = keys.len(), "expired entries cleared");
        }
        keys.len()
    }

    /// Drop every entry from memory and disk. Hit/miss counters are kept.
    pub fn clear_all(&self) {
        let mut g = self.lock();
        g.entries.clear();
        g.size_bytes = 0;
        for key in scan_entry_keys(&self.dir) {
            remove_file_quiet(&entry_path(&self.dir, &key));
        }
        remove_file_quiet(&index_path(&self.dir));
        gauge!("cache_size_bytes").set(0.0);
    }

    /// Persist the index now.
    pub fn flush(&self) {
        let now = self.clock.now();
        let mut g = self.lock();
        self.flush_locked(&mut g, now);
    }

    pub fn stats(&self) -> CacheStats {
        let g = self.lock();
        let total = g.hits + g.misses;
        let hit_rate = if total > 0 {
            g.hits as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        CacheStats {
            hits: g.hits,
            misses: g.misses,
            hit_rate_percent: round2(hit_rate),
            evictions: g.evictions,
            expired: g.expired,
            entries: g.entries.len(),
            size_bytes: g.size_bytes,
            max_size_bytes: self.max_size_bytes,
        }
    }

    /// Expiry sweep + index flush; returns the fresh stats.
    pub fn optimize(&self) -> CacheStats {
        let removed = self.clear_expired();
        self.flush();
        let stats = self.stats();
        info!(target: "cache", removed, entries = stats.entries, size_mb = stats.size_mb(), hit_rate = stats.hit_rate_percent, "cache optimized");
        stats
    }

    pub fn recommendations(&self) -> Vec<String> {
        self.stats().recommendations()
    }

    /* ----------------------------
    Internals (lock held)
    ---------------------------- */

    fn load(&self) {
        let now = self.clock.now();
        // Index keys plus every entry file on disk: writes after the last
        // index flush are only found by the scan.
        let mut keys: BTreeSet<String> = match read_index(&self.dir) {
            Ok(index) => index.into_keys().collect(),
            Err(e) => {
                if index_path(&self.dir).exists() {
                    debug!(target: "cache", error = %e, "cache index unreadable; relying on directory scan");
                }
                BTreeSet::new()
            }
        };
        keys.extend(scan_entry_keys(&self.dir));

        let mut g = self.lock();
        let mut skipped = 0usize;
        for key in keys {
            let path = entry_path(&self.dir, &key);
            match read_entry(&path) {
                Ok(e) if e.key() == key && !e.is_expired(now) => {
                    g.size_bytes += e.size_bytes;
                    g.entries.insert(key, e);
                }
                Ok(e) if e.key() == key => {
                    remove_file_quiet(&path);
                }
                Ok(_) => {
                    skipped += 1;
                    remove_file_quiet(&path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    debug!(target: "cache", path = %path.display(), error = %e, "corrupt cache entry removed");
                    skipped += 1;
                    remove_file_quiet(&path);
                }
            }
        }
        self.make_room_locked(&mut g, 0);
        gauge!("cache_size_bytes").set(g.size_bytes as f64);
        debug!(target: "cache", dir = %self.dir.display(), entries = g.entries.len(), skipped, "cache loaded");
    }

    /// Insert an entry read back from disk, respecting the budget.
    fn admit_locked(&self, g: &mut Inner, key: String, e: CacheEntry) {
        if e.size_bytes > self.max_size_bytes {
            return;
        }
        self.make_room_locked(g, e.size_bytes);
        g.size_bytes += e.size_bytes;
        g.entries.insert(key, e);
        gauge!("cache_size_bytes").set(g.size_bytes as f64);
    }

    /// Evict oldest-by-creation until `size + incoming <= max`.
    fn make_room_locked(&self, g: &mut Inner, incoming: u64) {
        while g.size_bytes.saturating_add(incoming) > self.max_size_bytes && !g.entries.is_empty() {
            let oldest = g
                .entries
                .iter()
                .min_by(|a, b| a.1.created_at.cmp(&b.1.created_at).then_with(|| a.0.cmp(b.0)))
                .map(|(k, _)| k.clone());
            let Some(key) = oldest else { break };
            if let Some(e) = g.entries.remove(&key) {
                g.size_bytes = g.size_bytes.saturating_sub(e.size_bytes);
                g.evictions += 1;
                counter!("cache_evictions_total").increment(1);
                debug!(target: "cache", url = %e.url, size = e.size_bytes, "evicted to fit budget");
            }
            remove_file_quiet(&entry_path(&self.dir, &key));
        }
    }

    fn purge_expired_locked(&self, g: &mut Inner, key: &str) {
        if let Some(e) = g.entries.remove(key) {
            g.size_bytes = g.size_bytes.saturating_sub(e.size_bytes);
            g.expired += 1;
            counter!("cache_expired_total").increment(1);
        }
        remove_file_quiet(&entry_path(&self.dir, key));
        gauge!("cache_size_bytes").set(g.size_bytes as f64);
    }

    fn flush_locked(&self, g: &mut Inner, now: DateTime<Utc>) {
        let index: BTreeMap<String, IndexRecord> = g
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), IndexRecord::from(e)))
            .collect();
        if let Err(e) = write_index(&self.dir, &index) {
            debug!(target: "cache", error = %e, "cache index write failed");
        }
        g.last_index_flush = Some(now);
    }
}

impl Drop for ResponseCache {
    fn drop(&mut self) {
        let now = self.clock.now();
        let g = self.inner.get_mut().unwrap_or_else(|p| p.into_inner());
        let index: BTreeMap<String, IndexRecord> = g
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), IndexRecord::from(e)))
            .collect();
        if let Err(e) = write_index(&self.dir, &index) {
            debug!(target: "cache", error = %e, "cache index write on drop failed");
        }
        g.last_index_flush = Some(now);
    }
}

fn remove_file_quiet(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!(target: "cache", path = %path.display(), error = %e, "cache file removal failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ))
    }

    fn open(dir: &Path, max: u64, c: Arc<ManualClock>) -> ResponseCache {
        ResponseCache::with_clock(dir, max, Duration::from_secs(3600), c)
    }

    #[test]
    fn round_trip_and_header_isolation() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = open(tmp.path(), 1024, clock());
        let mut h = Headers::new();
        h.insert("Accept".into(), "text/html".into());

        cache.set("https://a.test/x", "<html>x</html>", &h, None);
        assert_eq!(cache.get("https://a.test/x", &h).as_deref(), Some("<html>x</html>"));
        assert_eq!(cache.get("https://a.test/x", &Headers::new()), None);

        let s = cache.stats();
        assert_eq!((s.hits, s.misses), (1, 1));
        assert_eq!(s.hit_rate_percent, 50.0);
    }

    #[test]
    fn empty_content_is_not_cached() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = open(tmp.path(), 1024, clock());
        cache.set("https://a.test/", "", &Headers::new(), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn replacing_a_key_keeps_size_accounting_exact() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = open(tmp.path(), 1024, clock());
        cache.set("https://a.test/", "aaaa", &Headers::new(), None);
        cache.set("https://a.test/", "bb", &Headers::new(), None);
        let s = cache.stats();
        assert_eq!(s.entries, 1);
        assert_eq!(s.size_bytes, 2);
        assert_eq!(s.evictions, 0);
    }

    #[test]
    fn expiry_via_clock() {
        let tmp = tempfile::tempdir().unwrap();
        let c = clock();
        let cache = open(tmp.path(), 1024, c.clone());
        cache.set("https://a.test/", "body", &Headers::new(), Some(Duration::from_secs(10)));

        c.advance(chrono::Duration::seconds(10));
        assert!(cache.get("https://a.test/", &Headers::new()).is_some());

        c.advance(chrono::Duration::seconds(1));
        assert!(cache.get("https://a.test/", &Headers::new()).is_none());
        let s = cache.stats();
        assert_eq!(s.entries, 0);
        assert_eq!(s.size_bytes, 0);
        assert_eq!(s.expired, 1);
    }

    #[test]
    fn oldest_entries_evicted_first() {
        let tmp = tempfile::tempdir().unwrap();
        let c = clock();
        let cache = open(tmp.path(), 10, c.clone());
        for (i, url) in ["u1", "u2", "u3"].iter().enumerate() {
            cache.set(url, "xxxx", &Headers::new(), None);
            c.advance(chrono::Duration::seconds(i as i64 + 1));
        }
        // 3 × 4 bytes > 10: u1 goes.
        let s = cache.stats();
        assert!(s.size_bytes <= 10);
        assert_eq!(s.evictions, 1);
        assert!(cache.get("u1", &Headers::new()).is_none());
        assert!(cache.get("u2", &Headers::new()).is_some());
        assert!(cache.get("u3", &Headers::new()).is_some());
    }

    #[test]
    fn oversized_entry_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = open(tmp.path(), 4, clock());
        cache.set("small", "abc", &Headers::new(), None);
        cache.set("big", "abcdefgh", &Headers::new(), None);
        assert!(cache.get("big", &Headers::new()).is_none());
        assert!(cache.get("small", &Headers::new()).is_some());
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn clear_expired_counts_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let c = clock();
        let cache = open(tmp.path(), 1024, c.clone());
        cache.set("a", "1", &Headers::new(), Some(Duration::from_secs(5)));
        cache.set("b", "2", &Headers::new(), Some(Duration::from_secs(500)));
        c.advance(chrono::Duration::seconds(60));
        assert_eq!(cache.clear_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn recommendations_thresholds() {
        let quiet = CacheStats {
            hits: 80,
            misses: 20,
            hit_rate_percent: 80.0,
            evictions: 0,
            expired: 0,
            entries: 3,
            size_bytes: 10,
            max_size_bytes: 100,
        };
        assert!(quiet.recommendations().is_empty());

        let noisy = CacheStats {
            hits: 10,
            misses: 90,
            hit_rate_percent: 10.0,
            evictions: 6,
            size_bytes: 95,
            ..quiet
        };
        let r = noisy.recommendations();
        assert_eq!(r.len(), 3);
        assert!(r[0].starts_with("Low cache hit rate"));
        assert!(r[1].starts_with("High eviction rate"));
        assert!(r[2].starts_with("Cache nearly full"));
    }
}
