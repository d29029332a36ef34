use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use crate::cache::key::{generate_key, is_safe_component};
use crate::config::{hours_to_duration, CacheConfig};
use crate::constants::DEFAULT_TTL_HOURS;
use crate::error::Result;
use crate::metrics::CacheMetrics;
use crate::types::{Account, Fetched};

const ENTRY_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";
/// In-flight writes finish well within this; older temp files were orphaned by a crash
const STALE_TEMP_AGE: Duration = Duration::from_secs(3600);

/// What was fetched, kept alongside the data for `list`/`stats` and debugging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheMetadata {
    #[serde(rename = "type")]
    pub cache_type: String,
    pub params: Value,
}

/// On-disk shape of one entry: `{account_dir}/{key}.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEnvelope {
    pub account: String,
    pub cached_at: DateTime<Utc>,
    pub key: String,
    pub metadata: CacheMetadata,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheEntrySummary {
    pub key: String,
    pub cache_type: String,
    pub cached_at: DateTime<Utc>,
    pub age_secs: u64,
    pub size_bytes: u64,
    pub expired: bool,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TypeStats {
    pub entries: usize,
    pub size_bytes: u64,
    pub expired: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CacheStats {
    pub account: String,
    pub dir: PathBuf,
    pub total_entries: usize,
    pub total_size_bytes: u64,
    pub expired_entries: usize,
    pub by_type: BTreeMap<String, TypeStats>,
}

/// Per-account JSON file cache with per-type TTLs.
///
/// Validity is judged from the file's modification time, so an entry is served
/// while `now - mtime < ttl(type)`. Reads never fail: anything unreadable is a miss.
/// Writes never fail either; a failed write is logged and the caller carries on
/// uncached. There is no locking: concurrent misses on one key both fetch, and the
/// last rename wins.
#[derive(Debug, Clone)]
pub struct CacheStore {
    account_id: String,
    dir: PathBuf,
    ttls: HashMap<String, Duration>,
}

impl CacheStore {
    pub fn new(root: &Path, account_id: &str, ttls: HashMap<String, Duration>) -> Self {
        Self {
            account_id: account_id.to_string(),
            dir: root.join(account_id),
            ttls,
        }
    }

    pub fn from_config(config: &CacheConfig, account: &Account) -> Self {
        Self::new(&config.dir, &account.id, config.ttl_table())
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn generate_key(&self, cache_type: &str, params: &Value) -> String {
        generate_key(cache_type, params)
    }

    /// Configured TTL for a type tag, 24h for unknown tags
    pub fn ttl(&self, cache_type: &str) -> Duration {
        self.ttls
            .get(cache_type)
            .copied()
            .unwrap_or_else(|| hours_to_duration(DEFAULT_TTL_HOURS))
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, ENTRY_EXTENSION))
    }

    pub fn is_valid(&self, key: &str, cache_type: &str) -> bool {
        match file_age(&self.entry_path(key)) {
            Some(age) => age < self.ttl(cache_type),
            None => false,
        }
    }

    pub fn get(&self, key: &str, cache_type: &str) -> Option<Value> {
        if !self.is_valid(key, cache_type) {
            return None;
        }
        read_envelope(&self.entry_path(key)).map(|envelope| envelope.data)
    }

    /// Write an entry, replacing any previous one. Returns false if nothing was written.
    pub fn set(&self, key: &str, data: &Value, metadata: CacheMetadata) -> bool {
        let envelope = CacheEnvelope {
            account: self.account_id.clone(),
            cached_at: Utc::now(),
            key: key.to_string(),
            metadata,
            data: data.clone(),
        };

        match self.write_envelope(key, &envelope) {
            Ok(bytes) => {
                CacheMetrics::record_write_bytes(bytes);
                debug!(key, bytes, "cache entry written");
                true
            }
            Err(e) => {
                CacheMetrics::record_write_error();
                warn!("Failed to write cache entry {}: {}", key, e);
                false
            }
        }
    }

    // Each write gets its own temp file, renamed over the entry once complete.
    // The temp file is removed on drop if anything fails before the rename.
    fn write_envelope(&self, key: &str, envelope: &CacheEnvelope) -> Result<usize> {
        fs::create_dir_all(&self.dir)?;
        let body = serde_json::to_vec_pretty(envelope)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(&format!("{}.", key))
            .suffix(&format!(".{}", TEMP_EXTENSION))
            .tempfile_in(&self.dir)?;
        tmp.write_all(&body)?;
        tmp.flush()?;
        tmp.persist(self.entry_path(key)).map_err(|e| e.error)?;
        Ok(body.len())
    }

    /// Serve `(cache_type, params)` from cache, or run `fetch` and cache its result.
    ///
    /// Errors from `fetch` propagate unchanged and nothing is written.
    pub async fn get_or_fetch<T, F, Fut>(
        &self,
        cache_type: &str,
        params: Value,
        fetch: F,
    ) -> Result<Fetched<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let key = self.generate_key(cache_type, &params);

        if let Some(value) = self.get(&key, cache_type) {
            match serde_json::from_value::<T>(value) {
                Ok(data) => {
                    CacheMetrics::record_hit(cache_type);
                    debug!(key = %key, "cache hit");
                    return Ok(Fetched {
                        data,
                        from_cache: true,
                        cache_key: key,
                    });
                }
                Err(e) => debug!("Cached entry {} has an unexpected shape ({}); refetching", key, e),
            }
        }

        CacheMetrics::record_miss(cache_type);
        debug!(key = %key, "cache miss");
        self.fetch_and_store(key, cache_type, params, fetch).await
    }

    /// Always run `fetch` and overwrite the entry, skipping the lookup.
    pub async fn refresh<T, F, Fut>(
        &self,
        cache_type: &str,
        params: Value,
        fetch: F,
    ) -> Result<Fetched<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let key = self.generate_key(cache_type, &params);
        self.fetch_and_store(key, cache_type, params, fetch).await
    }

    async fn fetch_and_store<T, F, Fut>(
        &self,
        key: String,
        cache_type: &str,
        params: Value,
        fetch: F,
    ) -> Result<Fetched<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let data = fetch().await?;

        match serde_json::to_value(&data) {
            Ok(value) => {
                let metadata = CacheMetadata {
                    cache_type: cache_type.to_string(),
                    params,
                };
                self.set(&key, &value, metadata);
            }
            Err(e) => warn!("Fetched data for {} is not serializable, not caching: {}", key, e),
        }

        Ok(Fetched {
            data,
            from_cache: false,
            cache_key: key,
        })
    }

    /// Remove one entry. Returns whether a file was deleted.
    pub fn invalidate(&self, key: &str) -> bool {
        if !is_safe_component(key) {
            warn!(key, "refusing to invalidate a key that is not a plain file name");
            return false;
        }
        fs::remove_file(self.entry_path(key)).is_ok()
    }

    /// Remove every entry for this account, plus any leftover temp files
    pub fn clear(&self) -> usize {
        let mut removed = 0;
        for path in self.entry_files() {
            if fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        self.sweep_temp_files(Duration::ZERO);
        info!(account = %self.account_id, removed, "cache cleared");
        removed
    }

    /// Delete expired and corrupt entries, returning how many were removed.
    pub fn clear_expired(&self) -> usize {
        let mut removed = 0;
        for path in self.entry_files() {
            let stale = match read_envelope(&path) {
                Some(envelope) => match file_age(&path) {
                    Some(age) => age >= self.ttl(&envelope.metadata.cache_type),
                    None => true,
                },
                None => true,
            };
            if stale && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        let orphaned = self.sweep_temp_files(STALE_TEMP_AGE);
        CacheMetrics::record_swept(removed + orphaned);
        info!(account = %self.account_id, removed, orphaned, "expired cache entries cleared");
        removed
    }

    /// Summaries of all readable entries, oldest first. Corrupt entries are deleted.
    pub fn list(&self) -> Vec<CacheEntrySummary> {
        let mut entries = Vec::new();
        let mut corrupt = 0;

        for path in self.entry_files() {
            let (envelope, meta) = match (read_envelope(&path), fs::metadata(&path)) {
                (Some(envelope), Ok(meta)) => (envelope, meta),
                _ => {
                    if fs::remove_file(&path).is_ok() {
                        corrupt += 1;
                    }
                    continue;
                }
            };
            let age = file_age(&path).unwrap_or_default();
            let ttl = self.ttl(&envelope.metadata.cache_type);
            entries.push(CacheEntrySummary {
                key: envelope.key,
                cache_type: envelope.metadata.cache_type,
                cached_at: envelope.cached_at,
                age_secs: age.as_secs(),
                size_bytes: meta.len(),
                expired: age >= ttl,
            });
        }

        if corrupt > 0 {
            CacheMetrics::record_swept(corrupt);
            warn!(account = %self.account_id, corrupt, "deleted corrupt cache entries");
        }
        entries.sort_by(|a, b| a.cached_at.cmp(&b.cached_at).then_with(|| a.key.cmp(&b.key)));
        entries
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            account: self.account_id.clone(),
            dir: self.dir.clone(),
            ..CacheStats::default()
        };

        for entry in self.list() {
            stats.total_entries += 1;
            stats.total_size_bytes += entry.size_bytes;
            let by_type = stats.by_type.entry(entry.cache_type).or_default();
            by_type.entries += 1;
            by_type.size_bytes += entry.size_bytes;
            if entry.expired {
                stats.expired_entries += 1;
                by_type.expired += 1;
            }
        }
        stats
    }

    /// Delete temp files at least `min_age` old; returns how many went.
    fn sweep_temp_files(&self, min_age: Duration) -> usize {
        let mut removed = 0;
        for path in self.files_with_extension(TEMP_EXTENSION) {
            let old_enough = file_age(&path).map_or(true, |age| age >= min_age);
            if old_enough && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(account = %self.account_id, removed, "removed leftover temp files");
        }
        removed
    }

    fn entry_files(&self) -> Vec<PathBuf> {
        self.files_with_extension(ENTRY_EXTENSION)
    }

    fn files_with_extension(&self, extension: &str) -> Vec<PathBuf> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(_) => return Vec::new(),
        };
        read_dir
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(extension))
            .collect()
    }
}

/// Time since last write; None if the file can't be stat'ed
fn file_age(path: &Path) -> Option<Duration> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    Some(
        SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO),
    )
}

fn read_envelope(path: &Path) -> Option<CacheEnvelope> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}
