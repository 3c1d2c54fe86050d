//! Forge Artifact - tiered artifact storage
//!
//! Stores the raw images of a product-generation run:
//! - Durable blob store first ([`DurableStore`])
//! - Short-TTL in-process [`FallbackCache`] when the store is unavailable
//! - Uniform resolution of either tier through [`ArtifactTiering::resolve`]
//!
//! Also hosts the cooperative [`CancellationToken`] shared by every crate in
//! the workspace.
//!
//! # Example
//!
//! ```rust,ignore
//! use forge_artifact::{ArtifactTiering, CancellationToken, ImageInput, InMemoryDurableStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let tiering = ArtifactTiering::new(Arc::new(InMemoryDurableStore::new()), "product-images");
//! let report = tiering
//!     .acquire_batch(&[ImageInput::encoded(b64)], "01J...", &CancellationToken::new())
//!     .await?;
//! let source = tiering.resolve(&report.refs[0]).await?.image_source();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod cache;
pub mod cancel;
pub mod error;
pub mod store;
pub mod tiering;
pub mod types;

pub use cache::{CacheStats, FallbackCache, FallbackEntry, DEFAULT_FALLBACK_TTL};
pub use cancel::{CancellationToken, TimeoutGuard};
pub use error::{AcquireError, StoreError};
pub use store::{DurableStore, InMemoryDurableStore};
pub use tiering::{AcquisitionReport, ArtifactTiering};
pub use types::{
    fallback_key, raw_key, sniff_content_type, ArtifactRef, ArtifactTier, ImageInput,
    ResolvedArtifact,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
