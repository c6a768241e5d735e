//! Expiring response cache persisted to a single JSON document
//!
//! Provides an `ExpiringCache` that remembers API results for 24 hours so that
//! repeated questions about the same topic do not hit the remote API again.

use directories::ProjectDirs;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use super::clock::{to_unix_secs, Clock, SystemClock};

/// How long an entry stays fresh, in seconds
pub const TTL_SECS: u64 = 86_400;

/// File name of the cache document inside the platform cache directory
const CACHE_FILE_NAME: &str = "response_cache.json";

/// A single cached value as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// When the value was stored, in fractional unix seconds
    pub timestamp: f64,
    /// The cached payload
    pub data: Value,
}

/// Errors that can occur when writing to the cache
#[derive(Debug, Error)]
pub enum CacheError {
    /// Keys must contain at least one character
    #[error("cache key must not be empty")]
    EmptyKey,

    /// The value could not be represented as JSON
    #[error("failed to serialize cache value: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The cache document could not be written
    #[error("failed to write cache document {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Key-value store whose entries expire after [`TTL_SECS`]
///
/// The whole store is mirrored in memory and rewritten to disk on every
/// [`put`](ExpiringCache::put). Expired entries are not removed by reads;
/// call [`purge_expired`](ExpiringCache::purge_expired) to drop them.
///
/// There is no locking: two caches pointed at the same document will
/// overwrite each other's writes, with the last writer winning.
#[derive(Debug)]
pub struct ExpiringCache<C: Clock = SystemClock> {
    /// Location of the backing document
    path: PathBuf,
    /// In-memory mirror of the document
    entries: BTreeMap<String, CacheEntry>,
    clock: C,
}

impl ExpiringCache<SystemClock> {
    /// Opens the cache document at `path`
    ///
    /// A missing, unreadable or malformed document yields an empty cache.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_clock(path, SystemClock)
    }

    /// Opens the cache in the XDG-compliant cache directory
    ///
    /// Uses `~/.cache/engtutor/response_cache.json` on Linux, or the
    /// equivalent path on other platforms. Returns `None` if the cache
    /// directory cannot be determined (e.g., no home directory).
    pub fn open_default() -> Option<Self> {
        default_path().map(Self::open)
    }
}

/// Returns the default location of the cache document, if one can be determined
pub fn default_path() -> Option<PathBuf> {
    let project_dirs = ProjectDirs::from("", "", "engtutor")?;
    Some(project_dirs.cache_dir().join(CACHE_FILE_NAME))
}

impl<C: Clock> ExpiringCache<C> {
    /// Opens the cache document at `path`, reading time from `clock`
    pub fn with_clock(path: impl Into<PathBuf>, clock: C) -> Self {
        let path = path.into();
        let entries = load_entries(&path);
        Self {
            path,
            entries,
            clock,
        }
    }

    /// Path of the backing document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries held, fresh or expired
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the cache holds no entries at all
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the value stored under `key` if it is still fresh
    ///
    /// Missing, expired and empty keys all read as `None`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        if key.is_empty() {
            return None;
        }

        let entry = self.entries.get(key)?;
        if self.is_fresh(entry) {
            Some(&entry.data)
        } else {
            debug!(key, "cache entry expired");
            None
        }
    }

    /// Returns the fresh value under `key` deserialized as `T`
    ///
    /// A payload that does not match `T` reads as `None`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match T::deserialize(value) {
            Ok(data) => Some(data),
            Err(e) => {
                debug!(key, error = %e, "cached payload has unexpected shape");
                None
            }
        }
    }

    /// When the entry under `key` was stored, fresh or not
    pub fn stored_at(&self, key: &str) -> Option<f64> {
        self.entries.get(key).map(|entry| entry.timestamp)
    }

    /// Stores `value` under `key` and persists the whole cache
    ///
    /// The in-memory cache is updated before the document is written, so a
    /// failed write still leaves the new value visible to [`get`](Self::get).
    ///
    /// # Returns
    /// * `Ok(())` once the document has been written
    /// * `Err(CacheError::EmptyKey)` if `key` is empty; nothing is stored
    /// * `Err(CacheError::Serialize)` if `value` is not representable as JSON
    /// * `Err(CacheError::Io)` if directory creation or file writing fails
    pub fn put<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), CacheError> {
        if key.is_empty() {
            return Err(CacheError::EmptyKey);
        }
        let data = serde_json::to_value(value)?;

        let mut timestamp = to_unix_secs(self.clock.now());
        // Never record an older time than the entry being replaced.
        if let Some(previous) = self.entries.get(key) {
            timestamp = timestamp.max(previous.timestamp);
        }

        self.entries
            .insert(key.to_string(), CacheEntry { timestamp, data });
        self.persist()
    }

    /// Removes every expired entry and returns how many were dropped
    ///
    /// The document is only rewritten when something was removed.
    pub fn purge_expired(&mut self) -> Result<usize, CacheError> {
        let now = to_unix_secs(self.clock.now());
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now - entry.timestamp < TTL_SECS as f64);

        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, "purged expired cache entries");
            self.persist()?;
        }
        Ok(removed)
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        to_unix_secs(self.clock.now()) - entry.timestamp < TTL_SECS as f64
    }

    /// Writes the document through a sibling temporary file
    ///
    /// The rename keeps the previous document intact if serialization or the
    /// write itself fails part way.
    fn persist(&self) -> Result<(), CacheError> {
        let io_error = |source| CacheError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_error)?;
            }
        }

        let json = serde_json::to_string_pretty(&self.entries)?;
        let tmp_path = temp_path(&self.path);
        if let Err(e) = fs::write(&tmp_path, json) {
            let _ = fs::remove_file(&tmp_path);
            return Err(io_error(e));
        }
        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(io_error(e));
        }

        debug!(path = %self.path.display(), entries = self.entries.len(), "cache document written");
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| CACHE_FILE_NAME.into());
    name.push(".tmp");
    path.with_file_name(name)
}

fn load_entries(path: &Path) -> BTreeMap<String, CacheEntry> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cache document unreadable, starting empty");
            return BTreeMap::new();
        }
    };

    match serde_json::from_str(&content) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cache document corrupt, starting empty");
            BTreeMap::new()
        }
    }
}
