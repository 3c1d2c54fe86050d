//! Capabilities of the product pipeline
//!
//! Each external tool is a black box with a typed request. Responses are
//! opaque JSON, decoded once into [`crate::outputs`] types by the
//! orchestrator. Image processing is the exception: its small response
//! shape is fixed.

use crate::context::ProductHints;
use crate::registry::{Capability, ToolRegistry};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-image processing (cleanup, background removal, resizing)
pub const PROCESS_IMAGE: Capability<ProcessImageRequest, ProcessedImage> =
    Capability::new("ProcessImage");
/// Visual product analysis
pub const VISION_ANALYSIS: Capability<VisionRequest, Value> = Capability::new("VisionAnalysis");
/// Reverse-image web search
pub const REVERSE_IMAGE_SEARCH: Capability<SearchRequest, Value> =
    Capability::new("ReverseImageSearch");
/// Scraping of candidate pages
pub const WEB_SCRAPE: Capability<ScrapeRequest, Value> = Capability::new("WebScrape");
/// Pricing and competitor analysis
pub const MARKET_ANALYSIS: Capability<MarketRequest, Value> = Capability::new("MarketAnalysis");
/// Target audience definition
pub const AUDIENCE_DEFINITION: Capability<AudienceRequest, Value> =
    Capability::new("AudienceDefinition");
/// Marketplace copy and translations
pub const CONTENT_REFINEMENT: Capability<ContentRequest, Value> =
    Capability::new("ContentRefinement");

/// Capabilities the stage graph needs that `registry` lacks
#[must_use]
pub fn missing_capabilities(registry: &ToolRegistry) -> Vec<&'static str> {
    [
        (PROCESS_IMAGE.name(), registry.contains(PROCESS_IMAGE)),
        (VISION_ANALYSIS.name(), registry.contains(VISION_ANALYSIS)),
        (REVERSE_IMAGE_SEARCH.name(), registry.contains(REVERSE_IMAGE_SEARCH)),
        (WEB_SCRAPE.name(), registry.contains(WEB_SCRAPE)),
        (MARKET_ANALYSIS.name(), registry.contains(MARKET_ANALYSIS)),
        (AUDIENCE_DEFINITION.name(), registry.contains(AUDIENCE_DEFINITION)),
        (CONTENT_REFINEMENT.name(), registry.contains(CONTENT_REFINEMENT)),
    ]
    .into_iter()
    .filter_map(|(name, present)| (!present).then_some(name))
    .collect()
}

/// One artifact to process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessImageRequest {
    /// Position in the request's image list
    pub index: usize,
    /// URL or `data:` URI of the raw image
    #[serde(skip_serializing)]
    pub image_source: String,
    /// Content type of the raw image
    pub content_type: String,
}

/// Processing result
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedImage {
    /// Where the processed image lives; `None` keeps the raw source
    pub image_source: Option<String>,
}

/// Vision analysis input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionRequest {
    /// Processed images
    #[serde(skip_serializing)]
    pub image_sources: Vec<String>,
    /// Number of images, for the audit summary
    pub image_count: usize,
    /// Caller-supplied hints
    pub hints: ProductHints,
}

/// Reverse-image search input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// Processed images
    #[serde(skip_serializing)]
    pub image_sources: Vec<String>,
    /// Number of images, for the audit summary
    pub image_count: usize,
}

/// Scrape input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeRequest {
    /// Candidate pages, already bounded
    pub urls: Vec<String>,
}

/// Market analysis input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketRequest {
    /// Vision output (`{}` when degraded)
    pub vision: Value,
    /// Search output (`{}` when degraded)
    pub search: Value,
    /// Scrape output (`{}` when skipped or degraded)
    pub scraped: Value,
    /// Caller-supplied hints
    pub hints: ProductHints,
}

/// Audience definition input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudienceRequest {
    /// Vision output
    pub vision: Value,
    /// Market output
    pub market: Value,
    /// Projected conversation context
    pub prompt_context: String,
}

/// Content refinement input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRequest {
    /// Vision output
    pub vision: Value,
    /// Market output
    pub market: Value,
    /// Caller-supplied hints
    pub hints: ProductHints,
    /// Languages to produce
    pub target_languages: Vec<String>,
    /// Projected conversation context
    pub prompt_context: String,
}
