//! Fallback artifact cache using moka
//!
//! Holds inlined image bytes when the durable store is unavailable. Entries
//! carry their own TTL; the cache is process-local and never shared across
//! instances.

use moka::future::Cache;
use moka::Expiry;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default TTL for fallback entries (30 minutes)
pub const DEFAULT_FALLBACK_TTL: Duration = Duration::from_secs(30 * 60);

/// Statistics for cache monitoring
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of entries in cache
    pub entry_count: u64,
}

/// Inlined artifact bytes
#[derive(Debug, Clone)]
pub struct FallbackEntry {
    /// Raw bytes
    pub bytes: Arc<[u8]>,
    /// MIME type
    pub content_type: String,
    ttl: Duration,
}

impl FallbackEntry {
    /// Time-to-live this entry was stored with
    #[inline]
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

struct PerEntryTtl;

impl Expiry<String, FallbackEntry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &FallbackEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &FallbackEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Short-TTL in-process artifact cache
#[derive(Clone)]
pub struct FallbackCache {
    inner: Cache<String, FallbackEntry>,
}

impl std::fmt::Debug for FallbackCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackCache")
            .field("entry_count", &self.inner.entry_count())
            .finish()
    }
}

impl FallbackCache {
    /// Create new cache with max capacity
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .expire_after(PerEntryTtl)
                .build(),
        }
    }

    /// Store bytes under `key` for `ttl`
    pub async fn set(
        &self,
        key: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
        content_type: impl Into<String>,
        ttl: Duration,
    ) {
        let entry = FallbackEntry {
            bytes: bytes.into(),
            content_type: content_type.into(),
            ttl,
        };
        self.inner.insert(key.into(), entry).await;
    }

    /// Get entry, if present and not expired
    #[inline]
    pub async fn get(&self, key: &str) -> Option<FallbackEntry> {
        self.inner.get(key).await
    }

    /// Remove entry
    #[inline]
    pub async fn remove(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    /// Check if cache contains key
    #[inline]
    pub async fn contains(&self, key: &str) -> bool {
        self.inner.get(key).await.is_some()
    }

    /// Get cache statistics
    ///
    /// Counts are approximate until pending maintenance has run.
    #[inline]
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.inner.entry_count(),
        }
    }

    /// Flush pending maintenance so counts are exact
    #[inline]
    pub async fn sync(&self) {
        self.inner.run_pending_tasks().await;
    }
}

impl Default for FallbackCache {
    /// Create cache with default capacity (1,000 entries)
    fn default() -> Self {
        Self::new(1_000)
    }
}
