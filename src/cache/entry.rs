// src/cache/entry.rs
//! Cache entry record, key derivation and the on-disk file helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Request headers taking part in the cache key (sorted by name).
pub type Headers = BTreeMap<String, String>;

pub(crate) const ENTRY_EXT: &str = "cache";
pub(crate) const INDEX_FILE: &str = "cache_index.json";

/// One cached response body. Self-describing on disk: carries its own TTL and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
    /// UTF-8 byte length of `content`.
    pub size_bytes: u64,
    pub url: String,
    #[serde(default)]
    pub headers: Headers,
}

impl CacheEntry {
    pub fn new(url: &str, content: &str, headers: &Headers, ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            content: content.to_string(),
            created_at: now,
            ttl_secs: ttl.as_secs(),
            size_bytes: content.len() as u64,
            url: url.to_string(),
            headers: headers.clone(),
        }
    }

    /// `None` when the TTL is too large to represent (never expires).
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.ttl_secs).ok()?;
        let ttl = chrono::Duration::try_seconds(secs)?;
        self.created_at.checked_add_signed(ttl)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map(|at| now > at).unwrap_or(false)
    }

    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_seconds().max(0)
    }

    /// Key recomputed from the entry's own url + headers.
    pub fn key(&self) -> String {
        cache_key(&self.url, &self.headers)
    }
}

/// SHA-256 hex over the JSON of `url` and the sorted header pairs.
pub fn cache_key(url: &str, headers: &Headers) -> String {
    let pairs: Vec<(&String, &String)> = headers.iter().collect();
    let payload = serde_json::json!({ "url": url, "headers": pairs });
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Index line: enough to warm-start without opening every entry first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct IndexRecord {
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
    pub url: String,
    pub size_bytes: u64,
}

impl From<&CacheEntry> for IndexRecord {
    fn from(e: &CacheEntry) -> Self {
        Self {
            created_at: e.created_at,
            ttl_secs: e.ttl_secs,
            url: e.url.clone(),
            size_bytes: e.size_bytes,
        }
    }
}

// ------------------------------------------------------------
// File helpers (all best-effort; callers swallow errors)
// ------------------------------------------------------------

pub(crate) fn entry_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.{ENTRY_EXT}"))
}

pub(crate) fn index_path(dir: &Path) -> PathBuf {
    dir.join(INDEX_FILE)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    let mut f = fs::File::create(&tmp)?;
    f.write_all(bytes)?;
    f.sync_all()?;
    fs::rename(tmp, path)
}

pub(crate) fn read_entry(path: &Path) -> io::Result<CacheEntry> {
    let buf = fs::read_to_string(path)?;
    serde_json::from_str(&buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub(crate) fn write_entry(dir: &Path, key: &str, entry: &CacheEntry) -> io::Result<()> {
    let json = serde_json::to_vec(entry).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    write_atomic(&entry_path(dir, key), &json)
}

pub(crate) fn read_index(dir: &Path) -> io::Result<BTreeMap<String, IndexRecord>> {
    let buf = fs::read_to_string(index_path(dir))?;
    serde_json::from_str(&buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub(crate) fn write_index(dir: &Path, index: &BTreeMap<String, IndexRecord>) -> io::Result<()> {
    let json =
        serde_json::to_vec_pretty(index).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    write_atomic(&index_path(dir), &json)
}

/// Keys of every `*.cache` file in `dir`.
pub(crate) fn scan_entry_keys(dir: &Path) -> Vec<String> {
    let Ok(rd) = fs::read_dir(dir) else {
        return Vec::new();
    };
    rd.filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|x| x.to_str()) == Some(ENTRY_EXT))
        .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
        .collect()
}
