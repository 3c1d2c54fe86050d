//! Artifact storage tiering
//!
//! Acquisition tries the durable store first and falls back to the
//! in-process cache on any failure. Only total loss of a batch is fatal.
//! Every downstream read goes through [`ArtifactTiering::resolve`], so no
//! stage branches on the tier.

use crate::cache::{FallbackCache, DEFAULT_FALLBACK_TTL};
use crate::cancel::CancellationToken;
use crate::error::{AcquireError, StoreError};
use crate::store::DurableStore;
use crate::types::{fallback_key, raw_key, ArtifactRef, ArtifactTier, ImageInput, ResolvedArtifact};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of acquiring a batch of inputs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquisitionReport {
    /// Acquired refs, in input order
    pub refs: Vec<ArtifactRef>,
    /// Inputs that could not be decoded, with reasons
    pub rejected: Vec<(usize, String)>,
    /// Number of inputs offered
    pub attempted: usize,
}

impl AcquisitionReport {
    /// Refs stored in the durable tier
    #[must_use]
    pub fn durable_count(&self) -> usize {
        self.count(ArtifactTier::Durable)
    }

    /// Refs stored in the fallback tier
    #[must_use]
    pub fn fallback_count(&self) -> usize {
        self.count(ArtifactTier::Fallback)
    }

    fn count(&self, tier: ArtifactTier) -> usize {
        self.refs.iter().filter(|r| r.tier == tier).count()
    }
}

/// Durable store with in-memory fallback
#[derive(Clone)]
pub struct ArtifactTiering {
    durable: Arc<dyn DurableStore>,
    fallback: FallbackCache,
    bucket: String,
    fallback_ttl: Duration,
}

impl std::fmt::Debug for ArtifactTiering {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactTiering")
            .field("bucket", &self.bucket)
            .field("fallback_ttl", &self.fallback_ttl)
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

impl ArtifactTiering {
    /// Create tiering over a durable store
    #[must_use]
    pub fn new(durable: Arc<dyn DurableStore>, bucket: impl Into<String>) -> Self {
        Self {
            durable,
            fallback: FallbackCache::default(),
            bucket: bucket.into(),
            fallback_ttl: DEFAULT_FALLBACK_TTL,
        }
    }

    /// With fallback TTL
    #[inline]
    #[must_use]
    pub fn with_fallback_ttl(mut self, ttl: Duration) -> Self {
        self.fallback_ttl = ttl;
        self
    }

    /// With a specific fallback cache
    #[inline]
    #[must_use]
    pub fn with_fallback_cache(mut self, cache: FallbackCache) -> Self {
        self.fallback = cache;
        self
    }

    /// Bucket used for durable uploads
    #[inline]
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Fallback cache handle
    #[inline]
    #[must_use]
    pub fn fallback_cache(&self) -> &FallbackCache {
        &self.fallback
    }

    /// Store one decoded input
    ///
    /// Uploads to `raw/{run_id}/image-{index}`; on any upload failure the
    /// bytes are cached under `base64-{run_id}-{index}` instead.
    ///
    /// A cancelled run never falls back: an upload abandoned because
    /// `cancel` fired leaves nothing in either tier.
    ///
    /// # Errors
    /// `StoreError::Cancelled` if `cancel` fired before or during the upload.
    pub async fn acquire(
        &self,
        bytes: &[u8],
        content_type: &str,
        run_id: &str,
        index: usize,
        cancel: &CancellationToken,
    ) -> Result<ArtifactRef, StoreError> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let logical_key = raw_key(run_id, index);
        let failure = match self
            .durable
            .upload(&self.bucket, &logical_key, bytes, content_type, cancel)
            .await
        {
            Ok(Some(key)) if !key.is_empty() => {
                tracing::debug!(run_id, index, key = %key, "artifact stored durably");
                return Ok(ArtifactRef::durable(logical_key, key, content_type));
            }
            Err(StoreError::Cancelled) => return Err(StoreError::Cancelled),
            _ if cancel.is_cancelled() => return Err(StoreError::Cancelled),
            Ok(_) => "durable store returned no key".to_string(),
            Err(e) => e.to_string(),
        };

        let locator = fallback_key(run_id, index);
        let ttl = chrono::Duration::from_std(self.fallback_ttl)
            .unwrap_or_else(|_| chrono::Duration::minutes(30));
        let expires_at = Utc::now() + ttl;
        self.fallback
            .set(locator.clone(), bytes.to_vec(), content_type, self.fallback_ttl)
            .await;

        tracing::warn!(
            run_id,
            index,
            locator = %locator,
            reason = %failure,
            "durable upload failed, artifact held in fallback cache"
        );
        Ok(ArtifactRef::fallback(logical_key, locator, content_type, expires_at))
    }

    /// Acquire every input of a run
    ///
    /// Partial tier failure is logged, not fatal. Acquisition stops early
    /// when `cancel` fires; the refs stored so far are kept.
    ///
    /// # Errors
    /// - `AcquireError::Cancelled` if cancelled before anything was stored
    /// - `AcquireError::NothingAcquired` if no input could be stored
    pub async fn acquire_batch(
        &self,
        inputs: &[ImageInput],
        run_id: &str,
        cancel: &CancellationToken,
    ) -> Result<AcquisitionReport, AcquireError> {
        let mut report = AcquisitionReport {
            attempted: inputs.len(),
            ..AcquisitionReport::default()
        };
        let mut cancelled = false;

        for (index, input) in inputs.iter().enumerate() {
            let (bytes, content_type) = match input.decode() {
                Ok(decoded) => decoded,
                Err(e) => {
                    tracing::warn!(run_id, index, error = %e, "input rejected");
                    report.rejected.push((index, e.to_string()));
                    continue;
                }
            };

            match self.acquire(&bytes, &content_type, run_id, index, cancel).await {
                Ok(artifact) => report.refs.push(artifact),
                Err(StoreError::Cancelled) => {
                    cancelled = true;
                    break;
                }
                Err(e) => report.rejected.push((index, e.to_string())),
            }
        }

        if report.refs.is_empty() {
            if cancelled {
                return Err(AcquireError::Cancelled);
            }
            return Err(AcquireError::NothingAcquired {
                attempted: report.attempted,
                rejected: report.rejected,
            });
        }

        let fallback = report.fallback_count();
        if fallback > 0 || !report.rejected.is_empty() {
            tracing::warn!(
                run_id,
                durable = report.durable_count(),
                fallback,
                rejected = report.rejected.len(),
                "partial artifact tier failure"
            );
        } else {
            tracing::info!(run_id, durable = report.durable_count(), "artifacts acquired");
        }
        Ok(report)
    }

    /// Resolve a ref into a URL or inlined bytes
    ///
    /// Fallback refs are re-read from the cache on every call.
    ///
    /// # Errors
    /// `StoreError::FallbackExpired` once a fallback entry's TTL has passed.
    pub async fn resolve(&self, artifact: &ArtifactRef) -> Result<ResolvedArtifact, StoreError> {
        match artifact.tier {
            ArtifactTier::Durable => Ok(ResolvedArtifact::Pointer {
                url: self.durable.object_url(&self.bucket, &artifact.locator),
            }),
            ArtifactTier::Fallback => {
                if artifact.is_expired(Utc::now()) {
                    return Err(StoreError::FallbackExpired(artifact.locator.clone()));
                }
                self.fallback
                    .get(&artifact.locator)
                    .await
                    .map(|entry| ResolvedArtifact::Inline {
                        bytes: entry.bytes,
                        content_type: entry.content_type,
                    })
                    .ok_or_else(|| StoreError::FallbackExpired(artifact.locator.clone()))
            }
        }
    }
}
