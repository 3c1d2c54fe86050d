//! Testing utilities for the Forge workspace
//!
//! Scripted tools, a flaky durable store and request fixtures shared by
//! the crate test suites.

#![allow(missing_docs)]

use async_trait::async_trait;
use forge_artifact::{
    CancellationToken, DurableStore, ImageInput, InMemoryDurableStore, StoreError,
};
use forge_core::{
    PipelineConfig, ProcessImageRequest, ProcessedImage, ProductPipeline, ProductRequest, Tool,
    ToolError, ToolRegistry, AUDIENCE_DEFINITION, CONTENT_REFINEMENT, MARKET_ANALYSIS,
    PROCESS_IMAGE, REVERSE_IMAGE_SEARCH, VISION_ANALYSIS, WEB_SCRAPE,
};
use forge_memory::{ActionEvent, MemoryKey, MemoryLog};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const TEST_USER: &str = "user-1";
pub const TEST_CONVERSATION: &str = "conv-1";

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

/// Tool answering every call with a fixed JSON value
///
/// Records the serialized input of each call.
#[derive(Debug)]
pub struct ScriptedTool {
    response: Value,
    delay: Option<Duration>,
    calls: Mutex<Vec<Value>>,
}

impl ScriptedTool {
    pub fn new(response: Value) -> Arc<Self> {
        Arc::new(Self {
            response,
            delay: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Answer only after `delay`
    pub fn delayed(response: Value, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            response,
            delay: Some(delay),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl<I> Tool<I, Value> for ScriptedTool
where
    I: Serialize + Send + 'static,
{
    async fn invoke(&self, input: I, _cancel: &CancellationToken) -> Result<Value, ToolError> {
        self.calls
            .lock()
            .push(serde_json::to_value(&input).unwrap_or(Value::Null));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.response.clone())
    }
}

/// Tool that always fails
#[derive(Debug)]
pub struct FailingTool {
    message: String,
}

impl FailingTool {
    pub fn new(message: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            message: message.into(),
        })
    }
}

#[async_trait]
impl<I, O> Tool<I, O> for FailingTool
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn invoke(&self, _input: I, _cancel: &CancellationToken) -> Result<O, ToolError> {
        Err(ToolError::failed(self.message.clone()))
    }
}

/// Tool that never answers; returns only once cancelled
#[derive(Debug, Default)]
pub struct HangingTool {
    started: AtomicUsize,
}

impl HangingTool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<I, O> Tool<I, O> for HangingTool
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn invoke(&self, _input: I, cancel: &CancellationToken) -> Result<O, ToolError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        cancel.cancelled().await;
        Err(ToolError::Cancelled)
    }
}

/// Image processor rewriting sources to `processed://{index}`
///
/// Fails for the indices given to [`ImageProcessor::failing_on`].
#[derive(Debug, Default)]
pub struct ImageProcessor {
    failing: HashSet<usize>,
    keep_raw: bool,
    seen: Mutex<Vec<ProcessImageRequest>>,
}

impl ImageProcessor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Processor that returns no source, keeping the raw image
    pub fn keeping_raw() -> Arc<Self> {
        Arc::new(Self {
            keep_raw: true,
            ..Self::default()
        })
    }

    pub fn failing_on(indices: impl IntoIterator<Item = usize>) -> Arc<Self> {
        Arc::new(Self {
            failing: indices.into_iter().collect(),
            ..Self::default()
        })
    }

    pub fn seen(&self) -> Vec<ProcessImageRequest> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Tool<ProcessImageRequest, ProcessedImage> for ImageProcessor {
    async fn invoke(
        &self,
        input: ProcessImageRequest,
        _cancel: &CancellationToken,
    ) -> Result<ProcessedImage, ToolError> {
        let index = input.index;
        self.seen.lock().push(input);
        if self.failing.contains(&index) {
            return Err(ToolError::failed(format!("cannot process image {index}")));
        }
        Ok(ProcessedImage {
            image_source: (!self.keep_raw).then(|| format!("processed://{index}")),
        })
    }
}

// ---------------------------------------------------------------------------
// Tool responses
// ---------------------------------------------------------------------------

pub fn vision_response() -> Value {
    json!({
        "productName": "Ceramic Table Lamp",
        "description": "Hand-glazed ceramic lamp with a linen shade",
        "category": "Lighting",
        "brand": "Lumo",
        "colors": ["white"],
        "materials": ["ceramic", "linen"]
    })
}

pub fn search_response() -> Value {
    json!({
        "pages": [
            {"url": "https://shop.example/lamp-1", "title": "Ceramic lamp"},
            {"url": "https://shop.example/lamp-2"}
        ]
    })
}

pub fn scrape_response() -> Value {
    json!({
        "pages": [
            {"url": "https://shop.example/lamp-1", "title": "Ceramic lamp", "price": 49.0},
            {"url": "https://shop.example/lamp-2", "price": 59.0}
        ]
    })
}

pub fn market_response() -> Value {
    json!({
        "averagePrice": 52.5,
        "minPrice": 39.0,
        "maxPrice": 65.0,
        "currency": "usd",
        "positioning": "mid-range"
    })
}

pub fn audience_response() -> Value {
    json!({
        "primaryAudience": "Home decor enthusiasts",
        "segments": ["renters", "students"],
        "keywords": ["bedside lamp"]
    })
}

pub fn content_response() -> Value {
    json!({
        "title": "Ceramic Table Lamp with Linen Shade",
        "description": "A hand-glazed ceramic base under a soft linen shade.",
        "recommendedPrice": 54.99,
        "currency": "USD",
        "tags": ["lamp", "ceramic"],
        "translations": {
            "es": {"title": "Lámpara de mesa de cerámica", "description": "Base de cerámica esmaltada."}
        }
    })
}

/// Every capability of the stage graph, backed by scripted tools
#[derive(Debug)]
pub struct StubTools {
    pub process: Arc<ImageProcessor>,
    pub vision: Arc<ScriptedTool>,
    pub search: Arc<ScriptedTool>,
    pub scrape: Arc<ScriptedTool>,
    pub market: Arc<ScriptedTool>,
    pub audience: Arc<ScriptedTool>,
    pub content: Arc<ScriptedTool>,
}

impl StubTools {
    pub fn new() -> Self {
        Self {
            process: ImageProcessor::new(),
            vision: ScriptedTool::new(vision_response()),
            search: ScriptedTool::new(search_response()),
            scrape: ScriptedTool::new(scrape_response()),
            market: ScriptedTool::new(market_response()),
            audience: ScriptedTool::new(audience_response()),
            content: ScriptedTool::new(content_response()),
        }
    }

    pub fn with_process(mut self, process: Arc<ImageProcessor>) -> Self {
        self.process = process;
        self
    }

    pub fn with_vision(mut self, response: Value) -> Self {
        self.vision = ScriptedTool::new(response);
        self
    }

    pub fn with_search(mut self, response: Value) -> Self {
        self.search = ScriptedTool::new(response);
        self
    }

    pub fn with_content(mut self, response: Value) -> Self {
        self.content = ScriptedTool::new(response);
        self
    }

    pub fn with_audience(mut self, response: Value) -> Self {
        self.audience = ScriptedTool::new(response);
        self
    }

    /// Registry holding every stub; later `register` calls override entries
    pub fn registry(&self) -> ToolRegistry {
        let registry = ToolRegistry::new();
        registry.register(PROCESS_IMAGE, self.process.clone());
        registry.register(VISION_ANALYSIS, self.vision.clone());
        registry.register(REVERSE_IMAGE_SEARCH, self.search.clone());
        registry.register(WEB_SCRAPE, self.scrape.clone());
        registry.register(MARKET_ANALYSIS, self.market.clone());
        registry.register(AUDIENCE_DEFINITION, self.audience.clone());
        registry.register(CONTENT_REFINEMENT, self.content.clone());
        registry
    }
}

impl Default for StubTools {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Durable store
// ---------------------------------------------------------------------------

/// How [`FlakyDurableStore`] fails an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFailure {
    /// `Ok(None)`
    NoKey,
    /// `Err(StoreError::Unavailable)`
    Error,
}

/// Durable store failing uploads of chosen image indices
#[derive(Debug)]
pub struct FlakyDurableStore {
    inner: InMemoryDurableStore,
    failing: HashSet<usize>,
    failure: UploadFailure,
    uploads: AtomicUsize,
}

impl FlakyDurableStore {
    pub fn failing_on(indices: impl IntoIterator<Item = usize>, failure: UploadFailure) -> Self {
        Self {
            inner: InMemoryDurableStore::new(),
            failing: indices.into_iter().collect(),
            failure,
            uploads: AtomicUsize::new(0),
        }
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn stored(&self) -> usize {
        self.inner.len()
    }

    fn index_of(key: &str) -> Option<usize> {
        key.rsplit_once("image-")
            .and_then(|(_, index)| index.parse().ok())
    }
}

#[async_trait]
impl DurableStore for FlakyDurableStore {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, StoreError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if Self::index_of(key).is_some_and(|i| self.failing.contains(&i)) {
            return match self.failure {
                UploadFailure::NoKey => Ok(None),
                UploadFailure::Error => Err(StoreError::unavailable("connection reset")),
            };
        }
        self.inner
            .upload(bucket, key, bytes, content_type, cancel)
            .await
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        self.inner.object_url(bucket, key)
    }
}

/// Durable store whose uploads stall until the run is cancelled
#[derive(Debug, Default)]
pub struct StallingDurableStore {
    uploads: AtomicUsize,
}

impl StallingDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DurableStore for StallingDurableStore {
    async fn upload(
        &self,
        _bucket: &str,
        key: &str,
        _bytes: &[u8],
        _content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, StoreError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        cancel
            .run_until_cancelled(tokio::time::sleep(Duration::from_secs(10)))
            .await
            .map(|()| Some(key.to_string()))
            .ok_or(StoreError::Cancelled)
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("stall://{bucket}/{key}")
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Tiny PNG-signed payload, distinct per `tag`
pub fn png_bytes(tag: u8) -> Vec<u8> {
    vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, tag]
}

pub fn png_input(tag: u8) -> ImageInput {
    ImageInput::from_bytes(png_bytes(tag))
}

pub fn test_key() -> MemoryKey {
    MemoryKey::new(TEST_USER, TEST_CONVERSATION)
}

/// Request for the test conversation carrying `images` PNG inputs
pub fn request_with_images(images: usize) -> ProductRequest {
    let tags = (0..images).map(|i| u8::try_from(i).unwrap_or(u8::MAX));
    ProductRequest::new(TEST_USER, TEST_CONVERSATION).with_images(tags.map(png_input))
}

/// Pipeline over `registry` and `durable` with a fresh in-memory log
pub fn pipeline(
    config: PipelineConfig,
    registry: ToolRegistry,
    durable: Arc<dyn DurableStore>,
) -> (ProductPipeline, Arc<MemoryLog>) {
    let memory = Arc::new(MemoryLog::in_memory());
    let pipeline = ProductPipeline::new(config, Arc::new(registry), durable, memory.clone())
        .expect("test pipeline");
    (pipeline, memory)
}

/// Pipeline over the default stubs and a healthy store
pub fn stub_pipeline(tools: &StubTools) -> (ProductPipeline, Arc<MemoryLog>) {
    pipeline(
        PipelineConfig::default(),
        tools.registry(),
        Arc::new(InMemoryDurableStore::new()),
    )
}

/// Events of the test conversation, oldest first
pub async fn events(memory: &MemoryLog) -> Vec<ActionEvent> {
    memory
        .get_memory(&test_key())
        .await
        .map(|record| record.events)
        .unwrap_or_default()
}

/// Action names of the test conversation, oldest first
pub async fn actions(memory: &MemoryLog) -> Vec<String> {
    events(memory).await.into_iter().map(|e| e.action).collect()
}

/// Install a test subscriber once; later calls are no-ops
pub fn init_test_tracing() {
    let config = forge_core::TelemetryConfig::default().with_directive("forge_core=debug");
    let _ = forge_core::init_tracing(&config);
}
