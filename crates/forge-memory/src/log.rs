//! Agent memory log
//!
//! Tiered (cache + durable) append-only event log keyed by
//! `(user, conversation)`:
//! - Reads: cache first, durable on miss or error, read-through on hit
//! - Writes: both tiers, best-effort, failures logged not raised
//! - Appends: read-modify-write serialized per key within the process
//! - Expiry: sweep of the durable tier, one record at a time

use crate::backend::{InMemoryMemoryStore, MemoryCache, MemoryStore, MokaMemoryCache};
use crate::config::MemoryConfig;
use crate::error::MemoryError;
use crate::event::ActionEvent;
use crate::persist::{DurableWriteMode, PendingWrite, PersistenceQueue, PersistenceSupervisor};
use crate::projector;
use crate::record::{MemoryKey, MemoryRecord, DEFAULT_MEMORY_TTL_DAYS};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Outcome of the durable half of a save
#[derive(Debug)]
pub enum DurableWrite {
    /// Persisted before the call returned
    Written,
    /// Rejected by the durable tier
    Failed(MemoryError),
    /// Handed to the persistence worker
    Queued(PendingWrite),
}

/// Per-tier outcome of a save
///
/// Saves never fail on tier errors; callers needing a hard guarantee use
/// [`SaveReport::confirm`] or re-read.
#[derive(Debug)]
pub struct SaveReport {
    /// Whether the cache tier accepted the record
    pub cache_written: bool,
    /// Durable tier outcome
    pub durable: DurableWrite,
}

impl SaveReport {
    /// Wait for the durable write and surface its error
    ///
    /// # Errors
    /// The durable tier's error, if it rejected the record.
    pub async fn confirm(self) -> Result<(), MemoryError> {
        match self.durable {
            DurableWrite::Written => Ok(()),
            DurableWrite::Failed(e) => Err(e),
            DurableWrite::Queued(pending) => pending.wait().await,
        }
    }
}

/// Outcome of an expiry sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired records found
    pub examined: usize,
    /// Records removed from the durable tier
    pub deleted: Vec<MemoryKey>,
    /// Cache removals that failed
    pub cache_failures: usize,
    /// Durable deletions that failed
    pub store_failures: usize,
}

enum DurableWriter {
    Inline,
    Queued(PersistenceQueue),
}

/// Tiered append-only event log
pub struct MemoryLog {
    cache: Arc<dyn MemoryCache>,
    store: Arc<dyn MemoryStore>,
    writer: DurableWriter,
    default_ttl: Duration,
    key_locks: DashMap<MemoryKey, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for MemoryLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLog")
            .field("default_ttl", &self.default_ttl)
            .field("queued", &matches!(self.writer, DurableWriter::Queued(_)))
            .field("locked_keys", &self.key_locks.len())
            .finish_non_exhaustive()
    }
}

impl MemoryLog {
    /// Create log over explicit tiers with inline durable writes
    #[must_use]
    pub fn new(cache: Arc<dyn MemoryCache>, store: Arc<dyn MemoryStore>) -> Self {
        Self {
            cache,
            store,
            writer: DurableWriter::Inline,
            default_ttl: Duration::days(DEFAULT_MEMORY_TTL_DAYS),
            key_locks: DashMap::new(),
        }
    }

    /// Create log with process-local tiers
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MokaMemoryCache::default()),
            Arc::new(InMemoryMemoryStore::new()),
        )
    }

    /// Build from configuration over a durable store
    ///
    /// Returns the supervisor of the persistence worker when
    /// `write_mode = "queued"`. Must be called from within a tokio runtime
    /// in that case.
    #[must_use]
    pub fn from_config(
        config: &MemoryConfig,
        store: Arc<dyn MemoryStore>,
    ) -> (Self, Option<PersistenceSupervisor>) {
        let cache = Arc::new(MokaMemoryCache::with_ttl(
            config.cache_capacity,
            config.cache_ttl(),
        ));
        let log = Self::new(cache, store.clone()).with_default_ttl(config.record_ttl());

        match config.write_mode {
            DurableWriteMode::Inline => (log, None),
            DurableWriteMode::Queued => {
                let (queue, supervisor) = PersistenceQueue::spawn(store, config.queue_capacity);
                (log.with_persistence_queue(queue), Some(supervisor))
            }
        }
    }

    /// With default record lifetime
    #[inline]
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Route durable writes through a persistence worker
    #[inline]
    #[must_use]
    pub fn with_persistence_queue(mut self, queue: PersistenceQueue) -> Self {
        self.writer = DurableWriter::Queued(queue);
        self
    }

    /// Default record lifetime
    #[inline]
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Fetch the record for `key`
    ///
    /// Tier errors degrade to the next tier or to `None`. Expired records
    /// read as absent.
    pub async fn get_memory(&self, key: &MemoryKey) -> Option<MemoryRecord> {
        let now = Utc::now();

        match self.cache.get(key).await {
            Ok(Some(stored)) => {
                let record = MemoryRecord::from_stored(stored);
                return (!record.is_expired(now)).then_some(record);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(%key, error = %e, "memory cache read failed"),
        }

        match self.store.load(key).await {
            Ok(Some(stored)) => {
                if let Err(e) = self.cache.put(stored.clone()).await {
                    tracing::warn!(%key, error = %e, "memory cache populate failed");
                }
                let record = MemoryRecord::from_stored(stored);
                (!record.is_expired(now)).then_some(record)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(%key, error = %e, "memory store read failed");
                None
            }
        }
    }

    /// Write `record` to both tiers
    ///
    /// # Errors
    /// `MemoryError::Serialization` only; tier failures are reported in the
    /// returned [`SaveReport`].
    pub async fn save_memory(&self, record: &MemoryRecord) -> Result<SaveReport, MemoryError> {
        let stored = record.to_stored()?;
        let key = &record.key;

        let cache_written = match self.cache.put(stored.clone()).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(%key, error = %e, "memory cache write failed");
                // A stale entry would shadow the durable copy on the next read.
                if let Err(e) = self.cache.remove(key).await {
                    tracing::error!(%key, error = %e, "stale memory cache entry not evicted");
                }
                false
            }
        };

        let durable = match &self.writer {
            DurableWriter::Inline => match self.store.save(stored).await {
                Ok(()) => DurableWrite::Written,
                Err(e) => {
                    tracing::warn!(%key, error = %e, "memory store write failed");
                    DurableWrite::Failed(e)
                }
            },
            DurableWriter::Queued(queue) => DurableWrite::Queued(queue.enqueue(stored).await),
        };

        Ok(SaveReport {
            cache_written,
            durable,
        })
    }

    /// Append `event` to the end of the record for `key`
    ///
    /// Starts a new record if none exists and refreshes its expiry. The
    /// read-modify-write holds a per-key lock, so concurrent appends from
    /// this process never drop each other's events.
    ///
    /// # Errors
    /// `MemoryError::Serialization` if the record cannot be encoded.
    pub async fn append(
        &self,
        key: &MemoryKey,
        event: ActionEvent,
    ) -> Result<SaveReport, MemoryError> {
        let lock = self.key_lock(key);
        let result = {
            let _guard = lock.lock().await;
            let now = Utc::now();
            let mut record = self
                .get_memory(key)
                .await
                .unwrap_or_else(|| MemoryRecord::new(key.clone(), now, self.default_ttl));
            record.events.push(event);
            record.expires_at = now + self.default_ttl;
            self.save_memory(&record).await
        };
        self.release_key_lock(key, lock);
        result
    }

    /// Remove the record for `key` from both tiers
    ///
    /// Returns whether the durable tier held it.
    pub async fn delete_memory(&self, key: &MemoryKey) -> bool {
        let lock = self.key_lock(key);
        let existed = {
            let _guard = lock.lock().await;
            self.delete_from_tiers(key).await.1.unwrap_or(false)
        };
        self.release_key_lock(key, lock);
        existed
    }

    /// Delete every record whose expiry is at or before `now`
    ///
    /// Expiry is checked again under each record's lock, so a record
    /// refreshed by an append after the scan survives. A failure on one
    /// record never stops the sweep.
    pub async fn delete_expired(&self, now: DateTime<Utc>) -> SweepReport {
        let keys = match self.store.expired_keys(now).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "expired-record scan failed");
                return SweepReport::default();
            }
        };

        let mut report = SweepReport {
            examined: keys.len(),
            ..SweepReport::default()
        };

        for key in keys {
            let lock = self.key_lock(&key);
            let outcome = {
                let _guard = lock.lock().await;
                if self.still_expired(&key, now).await {
                    Some(self.delete_from_tiers(&key).await)
                } else {
                    None
                }
            };
            self.release_key_lock(&key, lock);

            let Some((cache_ok, store_result)) = outcome else {
                tracing::debug!(%key, "record refreshed or gone since scan, skipped");
                continue;
            };
            if !cache_ok {
                report.cache_failures += 1;
            }
            match store_result {
                Ok(_) => report.deleted.push(key),
                Err(_) => report.store_failures += 1,
            }
        }

        tracing::info!(
            examined = report.examined,
            deleted = report.deleted.len(),
            cache_failures = report.cache_failures,
            store_failures = report.store_failures,
            "expired memory sweep finished"
        );
        report
    }

    /// Bounded prompt context for `key`
    pub async fn prompt_context(&self, key: &MemoryKey) -> String {
        let events = self
            .get_memory(key)
            .await
            .map(|record| record.events)
            .unwrap_or_default();
        projector::project(&events)
    }

    /// Whether `key` is present and expired; caller holds the key lock
    async fn still_expired(&self, key: &MemoryKey, now: DateTime<Utc>) -> bool {
        let cached = match self.cache.get(key).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(%key, error = %e, "memory cache read failed");
                None
            }
        };
        let current = match cached {
            Some(stored) => Some(stored),
            None => match self.store.load(key).await {
                Ok(stored) => stored,
                Err(e) => {
                    tracing::warn!(%key, error = %e, "memory store read failed");
                    None
                }
            },
        };
        current.is_some_and(|stored| stored.expires_at <= now)
    }

    async fn delete_from_tiers(&self, key: &MemoryKey) -> (bool, Result<bool, MemoryError>) {
        let cache_ok = match self.cache.remove(key).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(%key, error = %e, "memory cache delete failed");
                false
            }
        };
        let store_result = self.store.delete(key).await;
        if let Err(e) = &store_result {
            tracing::warn!(%key, error = %e, "memory store delete failed");
        }
        (cache_ok, store_result)
    }

    fn key_lock(&self, key: &MemoryKey) -> Arc<Mutex<()>> {
        self.key_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn release_key_lock(&self, key: &MemoryKey, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.key_locks
            .remove_if(key, |_, held| Arc::strong_count(held) == 1);
    }
}
