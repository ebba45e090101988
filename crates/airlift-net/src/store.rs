use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::disk::DiskCache;
use crate::key::CacheKey;
use crate::memory::MemoryCache;

/// TTL for mutable indices (docker tag lists, dist-tags).
pub const TTL_MUTABLE: Duration = Duration::from_secs(60 * 60);
/// TTL for immutable artifact metadata (release files, POMs, repodata).
pub const TTL_IMMUTABLE: Duration = Duration::from_secs(24 * 60 * 60);

/// Aggregate cache statistics for the `cache.stats` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_size: u64,
    pub entry_count: u64,
    pub details: CacheStatsDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatsDetails {
    pub index_size: u64,
    pub index_count: u64,
    pub artifact_size: u64,
    pub artifact_count: u64,
    pub memory_entries: u64,
}

/// The process-wide cache store: in-memory LRU over the on-disk
/// content-addressed store, with per-key single-flight so that N
/// concurrent resolutions of one index key produce one network call.
///
/// Owned by the process runtime and passed by reference into sessions.
#[derive(Clone)]
pub struct CacheStore {
    memory: Arc<MemoryCache>,
    disk: DiskCache,
    flights: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl CacheStore {
    /// Default in-memory entry bound for one process.
    pub const DEFAULT_MEMORY_ENTRIES: usize = 256;

    pub fn new(cache_path: &Path) -> Self {
        Self::with_memory_capacity(cache_path, Self::DEFAULT_MEMORY_ENTRIES)
    }

    pub fn with_memory_capacity(cache_path: &Path, entries: usize) -> Self {
        Self {
            memory: Arc::new(MemoryCache::new(entries)),
            disk: DiskCache::new(cache_path),
            flights: Arc::new(DashMap::new()),
        }
    }

    /// Access to the artifact area (partials, commits) for the fetch
    /// pipeline.
    pub fn disk(&self) -> &DiskCache {
        &self.disk
    }

    /// Fetch an index document through both cache tiers.
    ///
    /// `fetch` is invoked at most once per key across concurrent callers;
    /// everyone else blocks on the flight lock and reads the cached bytes.
    /// A `None` from `fetch` (404 upstream) is passed through uncached so
    /// multi-repository adapters can fall through.
    pub async fn index<F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        url: &str,
        fetch: F,
    ) -> miette::Result<Option<Vec<u8>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = miette::Result<Option<Vec<u8>>>>,
    {
        if let Some(body) = self.memory.get(key.hex()) {
            tracing::debug!("memory cache hit for {url}");
            return Ok(Some(body));
        }
        if let Some(body) = self.disk.index_get(key) {
            tracing::debug!("disk cache hit for {url}");
            self.memory.put(key.hex(), body.clone(), ttl);
            return Ok(Some(body));
        }

        let lock = self
            .flights
            .entry(key.hex().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // A concurrent flight may have landed while we waited.
        if let Some(body) = self.memory.get(key.hex()) {
            return Ok(Some(body));
        }
        if let Some(body) = self.disk.index_get(key) {
            self.memory.put(key.hex(), body.clone(), ttl);
            return Ok(Some(body));
        }

        let result = fetch().await;
        if let Ok(Some(body)) = &result {
            self.disk.index_put(key, body, ttl, url)?;
            self.memory.put(key.hex(), body.clone(), ttl);
        }
        self.flights.remove(key.hex());
        result
    }

    pub fn stats(&self) -> CacheStats {
        let ((index_size, index_count), (artifact_size, artifact_count)) = self.disk.stats();
        CacheStats {
            total_size: index_size + artifact_size,
            entry_count: index_count + artifact_count,
            details: CacheStatsDetails {
                index_size,
                index_count,
                artifact_size,
                artifact_count,
                memory_entries: self.memory.len() as u64,
            },
        }
    }

    /// Wipe both tiers.
    pub fn clear(&self) -> miette::Result<()> {
        self.memory.clear();
        self.disk.clear()
    }
}
