use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use airlift_util::error::AirliftError;
use airlift_util::fs::{atomic_write, dir_size, ensure_dir, file_count};

use crate::key::CacheKey;

/// Sidecar metadata stored next to each cached index body.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexMeta {
    /// Seconds since the epoch at acquisition.
    cached_at: u64,
    /// Time-to-live in seconds; 0 means never expires.
    ttl: u64,
    /// Source URL, kept for diagnostics.
    url: String,
}

impl IndexMeta {
    fn is_expired(&self) -> bool {
        if self.ttl == 0 {
            return false;
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        now > self.cached_at + self.ttl
    }
}

/// On-disk content-addressed store.
///
/// Layout: `index/<2-char>/<hex>` (+ `.meta` sidecar) for index snapshots,
/// `artifacts/<2-char>/<hex>` for artifact bodies with `.part` partials.
/// All writes go through a temp file and an atomic rename; entries are
/// replaced, never mutated.
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join("index").join(key.prefix()).join(key.hex())
    }

    fn meta_path(&self, key: &CacheKey) -> PathBuf {
        self.index_path(key).with_extension("meta")
    }

    /// Final resting place for a fully-verified artifact body.
    pub fn artifact_path(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join("artifacts")
            .join(key.prefix())
            .join(key.hex())
    }

    /// In-progress artifact body, eligible for byte-range resume.
    pub fn partial_path(&self, key: &CacheKey) -> PathBuf {
        self.artifact_path(key).with_extension("part")
    }

    /// Read a cached index body if present and fresh.
    pub fn index_get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let meta_bytes = std::fs::read(self.meta_path(key)).ok()?;
        let meta: IndexMeta = serde_json::from_slice(&meta_bytes).ok()?;
        if meta.is_expired() {
            tracing::debug!("disk index entry {key} expired");
            return None;
        }
        std::fs::read(self.index_path(key)).ok()
    }

    /// Store an index body with its TTL. Replaces any previous entry.
    pub fn index_put(
        &self,
        key: &CacheKey,
        body: &[u8],
        ttl: Duration,
        url: &str,
    ) -> miette::Result<()> {
        let meta = IndexMeta {
            cached_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            ttl: ttl.as_secs(),
            url: url.to_string(),
        };
        atomic_write(&self.index_path(key), body).map_err(AirliftError::Io)?;
        let meta_bytes = serde_json::to_vec(&meta).map_err(|e| AirliftError::Parse {
            message: format!("cache metadata serialization failed: {e}"),
        })?;
        atomic_write(&self.meta_path(key), &meta_bytes).map_err(AirliftError::Io)?;
        Ok(())
    }

    /// Whether a completed artifact body exists.
    pub fn artifact_get(&self, key: &CacheKey) -> Option<PathBuf> {
        let path = self.artifact_path(key);
        path.is_file().then_some(path)
    }

    /// Byte count of a partial download left by an interrupted session.
    pub fn partial_len(&self, key: &CacheKey) -> u64 {
        std::fs::metadata(self.partial_path(key))
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// Promote a finished partial to its final content address.
    pub fn commit_partial(&self, key: &CacheKey) -> miette::Result<PathBuf> {
        let part = self.partial_path(key);
        let fin = self.artifact_path(key);
        if let Some(parent) = fin.parent() {
            ensure_dir(parent).map_err(AirliftError::Io)?;
        }
        std::fs::rename(&part, &fin).map_err(AirliftError::Io)?;
        Ok(fin)
    }

    /// Discard a partial whose bytes can no longer be trusted.
    pub fn discard_partial(&self, key: &CacheKey) {
        let _ = std::fs::remove_file(self.partial_path(key));
    }

    /// `(total_size, entry_count)` per area: (index, artifacts).
    pub fn stats(&self) -> ((u64, u64), (u64, u64)) {
        let index = self.root.join("index");
        let artifacts = self.root.join("artifacts");
        (
            (dir_size(&index), file_count(&index)),
            (dir_size(&artifacts), file_count(&artifacts)),
        )
    }

    /// Remove every cached entry. Eviction only ever happens here.
    pub fn clear(&self) -> miette::Result<()> {
        for area in ["index", "artifacts"] {
            let dir = self.root.join(area);
            if dir.is_dir() {
                std::fs::remove_dir_all(&dir).map_err(AirliftError::Io)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airlift_core::Ecosystem;

    fn key(name: &str) -> CacheKey {
        CacheKey::artifact(Ecosystem::Pip, name, "1.0", None)
    }

    #[test]
    fn index_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(tmp.path());
        let k = key("idx");
        cache
            .index_put(&k, b"response", Duration::from_secs(3600), "https://x")
            .unwrap();
        assert_eq!(cache.index_get(&k).as_deref(), Some(b"response".as_ref()));
    }

    #[test]
    fn expired_index_not_served() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(tmp.path());
        let k = key("expired");
        cache
            .index_put(&k, b"stale", Duration::from_secs(1), "https://x")
            .unwrap();
        // Rewrite the sidecar to fake an old acquisition time.
        let meta_path = cache.meta_path(&k);
        let meta = r#"{"cached_at":1,"ttl":1,"url":"https://x"}"#;
        std::fs::write(&meta_path, meta).unwrap();
        assert!(cache.index_get(&k).is_none());
    }

    #[test]
    fn zero_ttl_never_expires() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(tmp.path());
        let k = key("forever");
        cache
            .index_put(&k, b"body", Duration::ZERO, "https://x")
            .unwrap();
        let meta_path = cache.meta_path(&k);
        let meta = r#"{"cached_at":1,"ttl":0,"url":"https://x"}"#;
        std::fs::write(&meta_path, meta).unwrap();
        assert!(cache.index_get(&k).is_some());
    }

    #[test]
    fn partial_commit_promotes() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(tmp.path());
        let k = key("artifact");
        let part = cache.partial_path(&k);
        ensure_dir(part.parent().unwrap()).unwrap();
        std::fs::write(&part, b"whole body").unwrap();
        assert_eq!(cache.partial_len(&k), 10);
        let fin = cache.commit_partial(&k).unwrap();
        assert_eq!(std::fs::read(&fin).unwrap(), b"whole body");
        assert_eq!(cache.partial_len(&k), 0);
        assert!(cache.artifact_get(&k).is_some());
    }

    #[test]
    fn stats_and_clear() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(tmp.path());
        cache
            .index_put(&key("a"), b"12345", Duration::ZERO, "https://x")
            .unwrap();
        let ((index_size, index_count), _) = cache.stats();
        assert!(index_size >= 5);
        assert_eq!(index_count, 2); // body + meta sidecar
        cache.clear().unwrap();
        let ((size_after, count_after), _) = cache.stats();
        assert_eq!(size_after, 0);
        assert_eq!(count_after, 0);
    }
}
