//! Storage tiers for memory records
//!
//! - [`MemoryCache`]: fast tier, consulted first on reads
//! - [`MemoryStore`]: durable tier, source of truth for expiry sweeps
//!
//! Both are keyed by [`MemoryKey`] and must tolerate concurrent access from
//! many pipeline runs.

use crate::error::MemoryError;
use crate::record::{MemoryKey, StoredMemory};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use moka::future::Cache;
use std::time::Duration;

/// Cache tier
#[async_trait]
pub trait MemoryCache: Send + Sync {
    /// Get cached record
    async fn get(&self, key: &MemoryKey) -> Result<Option<StoredMemory>, MemoryError>;

    /// Insert or replace a record
    async fn put(&self, memory: StoredMemory) -> Result<(), MemoryError>;

    /// Remove a record
    async fn remove(&self, key: &MemoryKey) -> Result<(), MemoryError>;
}

/// Durable tier
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Load a record
    async fn load(&self, key: &MemoryKey) -> Result<Option<StoredMemory>, MemoryError>;

    /// Insert or replace a record
    async fn save(&self, memory: StoredMemory) -> Result<(), MemoryError>;

    /// Delete a record; `Ok(false)` if it did not exist
    async fn delete(&self, key: &MemoryKey) -> Result<bool, MemoryError>;

    /// Keys of records with `expires_at <= now`
    async fn expired_keys(&self, now: DateTime<Utc>) -> Result<Vec<MemoryKey>, MemoryError>;
}

/// Cache tier backed by moka
#[derive(Clone)]
pub struct MokaMemoryCache {
    inner: Cache<MemoryKey, StoredMemory>,
}

impl std::fmt::Debug for MokaMemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaMemoryCache")
            .field("entry_count", &self.inner.entry_count())
            .finish()
    }
}

impl MokaMemoryCache {
    /// Create cache with max capacity and time-based expiration
    #[inline]
    #[must_use]
    pub fn with_ttl(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Get approximate entry count
    #[inline]
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

impl Default for MokaMemoryCache {
    /// 10,000 records, one hour TTL
    fn default() -> Self {
        Self::with_ttl(10_000, Duration::from_secs(3600))
    }
}

#[async_trait]
impl MemoryCache for MokaMemoryCache {
    async fn get(&self, key: &MemoryKey) -> Result<Option<StoredMemory>, MemoryError> {
        Ok(self.inner.get(key).await)
    }

    async fn put(&self, memory: StoredMemory) -> Result<(), MemoryError> {
        self.inner.insert(memory.key(), memory).await;
        Ok(())
    }

    async fn remove(&self, key: &MemoryKey) -> Result<(), MemoryError> {
        self.inner.invalidate(key).await;
        Ok(())
    }
}

/// Durable tier held in process memory
#[derive(Debug, Default)]
pub struct InMemoryMemoryStore {
    records: DashMap<MemoryKey, StoredMemory>,
}

impl InMemoryMemoryStore {
    /// Create new empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn load(&self, key: &MemoryKey) -> Result<Option<StoredMemory>, MemoryError> {
        Ok(self.records.get(key).map(|r| r.value().clone()))
    }

    async fn save(&self, memory: StoredMemory) -> Result<(), MemoryError> {
        self.records.insert(memory.key(), memory);
        Ok(())
    }

    async fn delete(&self, key: &MemoryKey) -> Result<bool, MemoryError> {
        Ok(self.records.remove(key).is_some())
    }

    async fn expired_keys(&self, now: DateTime<Utc>) -> Result<Vec<MemoryKey>, MemoryError> {
        let mut keys: Vec<MemoryKey> = self
            .records
            .iter()
            .filter(|r| r.value().expires_at <= now)
            .map(|r| r.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
