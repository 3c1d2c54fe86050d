//! Run context
//!
//! Everything a run needs is passed explicitly: the [`ProductRequest`] in,
//! a [`RunContext`] threaded through every stage call. Nothing about the
//! active user or conversation is stored on the pipeline itself.

use crate::stage::StageJournal;
use chrono::{DateTime, Utc};
use forge_artifact::ImageInput;
use forge_memory::MemoryKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Unique run identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub Ulid);

impl RunId {
    /// Generate new run ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One pipeline invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    /// Run ID
    pub run_id: RunId,
    /// Requesting user
    pub user_id: String,
    /// Conversation the run logs into
    pub conversation_id: String,
    /// Start time
    pub started_at: DateTime<Utc>,
}

impl PipelineRun {
    /// Start a run for `key`
    #[must_use]
    pub fn start(key: &MemoryKey) -> Self {
        Self {
            run_id: RunId::new(),
            user_id: key.user_id.clone(),
            conversation_id: key.conversation_id.clone(),
            started_at: Utc::now(),
        }
    }

    /// Memory key of the run's conversation
    #[inline]
    #[must_use]
    pub fn memory_key(&self) -> MemoryKey {
        MemoryKey::new(self.user_id.clone(), self.conversation_id.clone())
    }
}

/// Caller-supplied product hints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProductHints {
    /// Working title
    pub title: Option<String>,
    /// Seller's description
    pub description: Option<String>,
    /// Intended price
    pub price: Option<f64>,
    /// Currency of `price`
    pub currency: Option<String>,
    /// Category
    pub category: Option<String>,
    /// Seller tags
    pub tags: Vec<String>,
}

impl ProductHints {
    /// With title
    #[inline]
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// With price and currency
    #[inline]
    #[must_use]
    pub fn with_price(mut self, price: f64, currency: impl Into<String>) -> Self {
        self.price = Some(price);
        self.currency = Some(currency.into());
        self
    }

    /// With tags
    #[inline]
    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Input of one pipeline run
#[derive(Debug, Clone)]
pub struct ProductRequest {
    /// Conversation the run belongs to
    pub key: MemoryKey,
    /// Raw images
    pub images: Vec<ImageInput>,
    /// Seller hints
    pub hints: ProductHints,
}

impl ProductRequest {
    /// Create request for a conversation
    #[must_use]
    pub fn new(user_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            key: MemoryKey::new(user_id, conversation_id),
            images: Vec::new(),
            hints: ProductHints::default(),
        }
    }

    /// With one more image
    #[inline]
    #[must_use]
    pub fn with_image(mut self, image: ImageInput) -> Self {
        self.images.push(image);
        self
    }

    /// With images
    #[inline]
    #[must_use]
    pub fn with_images(mut self, images: impl IntoIterator<Item = ImageInput>) -> Self {
        self.images.extend(images);
        self
    }

    /// With hints
    #[inline]
    #[must_use]
    pub fn with_hints(mut self, hints: ProductHints) -> Self {
        self.hints = hints;
        self
    }
}

/// Per-run state threaded through stage calls
#[derive(Debug)]
pub struct RunContext {
    /// The run
    pub run: PipelineRun,
    /// Conversation key events are logged under
    pub key: MemoryKey,
    /// Stage records collected so far
    pub journal: StageJournal,
}

impl RunContext {
    /// Create context for `run`
    #[must_use]
    pub fn new(run: PipelineRun) -> Self {
        let key = run.memory_key();
        Self {
            run,
            key,
            journal: StageJournal::new(),
        }
    }

    /// Run ID as text, for log fields
    #[inline]
    #[must_use]
    pub fn run_id(&self) -> String {
        self.run.run_id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_are_unique_and_sortable() {
        let a = RunId::new();
        let b = RunId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 26);
    }

    #[test]
    fn context_uses_run_conversation() {
        let key = MemoryKey::new("u1", "c1");
        let ctx = RunContext::new(PipelineRun::start(&key));
        assert_eq!(ctx.key, key);
        assert!(ctx.journal.is_empty());
        assert_eq!(ctx.run_id(), ctx.run.run_id.to_string());
    }

    #[test]
    fn request_builder() {
        let request = ProductRequest::new("u", "c")
            .with_image(ImageInput::from_bytes(vec![1, 2, 3]))
            .with_hints(ProductHints::default().with_title("Lamp"));
        assert_eq!(request.images.len(), 1);
        assert_eq!(request.hints.title.as_deref(), Some("Lamp"));
        assert_eq!(request.key, MemoryKey::new("u", "c"));
    }
}
