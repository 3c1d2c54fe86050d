//! Durable blob store boundary
//!
//! The concrete object store (S3, MinIO, ...) lives outside this crate.
//! [`InMemoryDurableStore`] backs tests and single-process deployments.

use crate::cancel::CancellationToken;
use crate::error::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Durable blob storage keyed by `(bucket, key)`
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Upload bytes under `key`
    ///
    /// Returns the stored key. `Ok(None)` (or an empty key) signals the
    /// common "service unavailable" path without raising an error.
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, StoreError>;

    /// Location tools can fetch the object from
    fn object_url(&self, bucket: &str, key: &str) -> String;
}

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Arc<[u8]>,
    content_type: String,
}

/// Process-local durable store
///
/// Supports simulated outages through [`InMemoryDurableStore::set_available`].
#[derive(Debug)]
pub struct InMemoryDurableStore {
    objects: DashMap<(String, String), StoredObject>,
    available: AtomicBool,
}

impl InMemoryDurableStore {
    /// Create new empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            objects: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Toggle simulated availability
    #[inline]
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of stored objects
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if the store is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Bytes of a stored object
    #[must_use]
    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.bytes.to_vec())
    }

    /// Content type of a stored object
    #[must_use]
    pub fn content_type(&self, bucket: &str, key: &str) -> Option<String> {
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.content_type.clone())
    }
}

impl Default for InMemoryDurableStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        if !self.available.load(Ordering::SeqCst) {
            return Ok(None);
        }

        self.objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                bytes: Arc::from(bytes),
                content_type: content_type.to_string(),
            },
        );
        Ok(Some(key.to_string()))
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("memory://{bucket}/{key}")
    }
}
