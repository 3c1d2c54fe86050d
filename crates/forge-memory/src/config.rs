//! Memory log configuration

use crate::persist::DurableWriteMode;
use crate::record::DEFAULT_MEMORY_TTL_DAYS;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Memory log configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Record lifetime in days
    pub ttl_days: i64,
    /// Cache tier capacity (records)
    pub cache_capacity: u64,
    /// Cache tier TTL in seconds
    pub cache_ttl_secs: u64,
    /// How durable writes are performed
    pub write_mode: DurableWriteMode,
    /// Persistence queue depth when `write_mode = "queued"`
    pub queue_capacity: usize,
}

impl MemoryConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With record lifetime
    #[inline]
    #[must_use]
    pub fn with_ttl_days(mut self, days: i64) -> Self {
        self.ttl_days = days;
        self
    }

    /// With durable write mode
    #[inline]
    #[must_use]
    pub fn with_write_mode(mut self, mode: DurableWriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    /// Record lifetime
    #[inline]
    #[must_use]
    pub fn record_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.ttl_days)
    }

    /// Cache tier TTL
    #[inline]
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            ttl_days: DEFAULT_MEMORY_TTL_DAYS,
            cache_capacity: 10_000,
            cache_ttl_secs: 3600,
            write_mode: DurableWriteMode::Inline,
            queue_capacity: 256,
        }
    }
}
