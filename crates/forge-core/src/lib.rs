//! Forge Core - product-generation pipeline
//!
//! Turns a set of product images into a marketplace-ready draft by running
//! external tools as audited stages:
//! - [`ProductPipeline`]: stage graph, concurrency, failure policy
//! - [`StageRunner`]: timing + lifecycle events around one tool call
//! - [`ToolRegistry`]: typed capability → tool resolution
//! - [`assemble`]: pure draft assembly with per-field precedence
//!
//! Artifact storage lives in `forge-artifact`, the audit log and prompt
//! context in `forge-memory`.
//!
//! # Example
//!
//! ```rust,ignore
//! use forge_core::{PipelineConfig, ProductPipeline, ProductRequest, ToolRegistry};
//! use forge_artifact::{CancellationToken, ImageInput, InMemoryDurableStore};
//! use forge_memory::MemoryLog;
//! use std::sync::Arc;
//!
//! # async fn example(registry: ToolRegistry, image: Vec<u8>) -> Result<(), forge_core::PipelineError> {
//! let pipeline = ProductPipeline::new(
//!     PipelineConfig::default(),
//!     Arc::new(registry),
//!     Arc::new(InMemoryDurableStore::new()),
//!     Arc::new(MemoryLog::in_memory()),
//! )?;
//! let request = ProductRequest::new("user-1", "conv-1").with_image(ImageInput::from_bytes(image));
//! let outcome = pipeline.generate(request, &CancellationToken::new()).await?;
//! println!("{}", outcome.draft.title);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod config;
pub mod context;
pub mod draft;
pub mod error;
pub mod orchestrator;
pub mod outputs;
pub mod registry;
pub mod report;
pub mod stage;
pub mod telemetry;
pub mod tools;

pub use config::PipelineConfig;
pub use context::{PipelineRun, ProductHints, ProductRequest, RunContext, RunId};
pub use draft::{
    assemble, slugify, AssemblyDefaults, AssemblyInput, ImageRef, ProductDraft, SeoFields,
    DEFAULT_TITLE,
};
pub use error::{PipelineError, StageError, ToolError};
pub use orchestrator::{
    PipelineOutcome, ProductPipeline, BEGIN_PRODUCT_GENERATION, COMPLETE_PRODUCT_GENERATION,
};
pub use outputs::{
    AudienceProfile, LocalizedText, MarketFindings, RefinedContent, ScrapeFindings, ScrapedPage,
    SearchFindings, SearchPage, StageOutput, VisionFindings,
};
pub use registry::{Capability, FnTool, Tool, ToolRegistry};
pub use report::{PerformanceReport, StageTiming};
pub use stage::{
    summarize, StageJournal, StageRecord, StageRun, StageRunner, StageStatus,
    DEFAULT_SUMMARY_LIMIT,
};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
pub use tools::{
    missing_capabilities, AudienceRequest, ContentRequest, MarketRequest, ProcessImageRequest,
    ProcessedImage, ScrapeRequest, SearchRequest, VisionRequest, AUDIENCE_DEFINITION,
    CONTENT_REFINEMENT, MARKET_ANALYSIS, PROCESS_IMAGE, REVERSE_IMAGE_SEARCH, VISION_ANALYSIS,
    WEB_SCRAPE,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
