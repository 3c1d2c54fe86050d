//! Product pipeline orchestrator
//!
//! Executes the stage graph once per run, start to terminal:
//! 1. Acquire artifacts (fatal only on total loss)
//! 2. Process each artifact (items dropped on failure; fatal if none left)
//! 3. Vision + reverse-image search, concurrently, under a group timeout
//! 4. Scrape, only when search produced candidate URLs
//! 5. Market analysis
//! 6. Audience + content, concurrently, under a group timeout
//! 7. Assemble the draft
//! 8. Emit the performance report and terminal event
//!
//! Stage failures in 3 to 6 degrade to `{}` and never fail the run.

use crate::config::PipelineConfig;
use crate::context::{PipelineRun, ProductRequest, RunContext};
use crate::draft::{assemble, AssemblyDefaults, AssemblyInput, ImageRef, ProductDraft};
use crate::error::{PipelineError, StageError};
use crate::outputs::{SearchFindings, StageOutput};
use crate::registry::ToolRegistry;
use crate::report::PerformanceReport;
use crate::stage::{elapsed_ms, StageRecord, StageRun, StageRunner};
use crate::tools::{
    missing_capabilities, AudienceRequest, ContentRequest, MarketRequest, ProcessImageRequest,
    ScrapeRequest, SearchRequest, VisionRequest, AUDIENCE_DEFINITION, CONTENT_REFINEMENT,
    MARKET_ANALYSIS, PROCESS_IMAGE, REVERSE_IMAGE_SEARCH, VISION_ANALYSIS, WEB_SCRAPE,
};
use forge_artifact::{
    AcquisitionReport, ArtifactRef, ArtifactTiering, CancellationToken, DurableStore,
};
use forge_memory::{ActionEvent, MemoryLog};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::time::Instant;

/// Memory-log action opening a run
pub const BEGIN_PRODUCT_GENERATION: &str = "BeginProductGeneration";
/// Memory-log action closing a successful run
pub const COMPLETE_PRODUCT_GENERATION: &str = "CompleteProductGeneration";

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// The run
    pub run: PipelineRun,
    /// Assembled draft
    pub draft: ProductDraft,
    /// Stage timings
    pub report: PerformanceReport,
    /// Every attempted stage, in completion order
    pub journal: Vec<StageRecord>,
    /// Artifact acquisition result
    pub acquisition: AcquisitionReport,
    /// Stages whose contribution was replaced by an empty result
    pub degraded: Vec<String>,
}

impl PipelineOutcome {
    /// Check if every attempted stage contributed
    #[inline]
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

/// Product-generation pipeline
pub struct ProductPipeline {
    config: PipelineConfig,
    tiering: ArtifactTiering,
    memory: Arc<MemoryLog>,
    runner: StageRunner,
}

impl std::fmt::Debug for ProductPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductPipeline")
            .field("config", &self.config)
            .field("tiering", &self.tiering)
            .field("runner", &self.runner)
            .finish_non_exhaustive()
    }
}

impl ProductPipeline {
    /// Create pipeline
    ///
    /// # Errors
    /// - `PipelineError::Config` if `config` is invalid
    /// - `PipelineError::ToolNotFound` if a stage capability is unregistered
    pub fn new(
        config: PipelineConfig,
        registry: Arc<ToolRegistry>,
        durable: Arc<dyn DurableStore>,
        memory: Arc<MemoryLog>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        if let Some(missing) = missing_capabilities(&registry).first() {
            return Err(PipelineError::ToolNotFound((*missing).to_string()));
        }

        let tiering = ArtifactTiering::new(durable, config.bucket.clone())
            .with_fallback_ttl(config.fallback_ttl());
        let runner = StageRunner::new(registry, memory.clone())
            .with_summary_limit(config.summary_limit_chars);

        Ok(Self {
            config,
            tiering,
            memory,
            runner,
        })
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Artifact tiers
    #[inline]
    #[must_use]
    pub fn tiering(&self) -> &ArtifactTiering {
        &self.tiering
    }

    /// Memory log
    #[inline]
    #[must_use]
    pub fn memory(&self) -> &Arc<MemoryLog> {
        &self.memory
    }

    /// Turn `request` into a product draft
    ///
    /// Every run leaves a `BeginProductGeneration` event and exactly one
    /// terminal event in the conversation's memory log.
    ///
    /// # Errors
    /// - `PipelineError::ArtifactAcquisition` if no image could be stored
    /// - `PipelineError::Cancelled` if `cancel` fired before any artifact
    ///   was stored
    /// - `PipelineError::ProcessingExhausted` if every artifact was dropped
    /// - `PipelineError::ToolNotFound` if a tool disappeared from the registry
    pub async fn generate(
        &self,
        request: ProductRequest,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome, PipelineError> {
        let started = Instant::now();
        let ctx = RunContext::new(PipelineRun::start(&request.key));

        tracing::info!(
            run_id = %ctx.run.run_id,
            user_id = %ctx.key.user_id,
            conversation_id = %ctx.key.conversation_id,
            images = request.images.len(),
            "product generation started"
        );
        self.log_lifecycle(
            &ctx,
            BEGIN_PRODUCT_GENERATION,
            json!({
                "runId": ctx.run.run_id,
                "imageCount": request.images.len(),
                "startedAt": ctx.run.started_at,
            }),
        )
        .await;

        match self.execute(&ctx, &request, cancel, started).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let elapsed_ms = elapsed_ms(started);
                tracing::error!(run_id = %ctx.run.run_id, error = %e, elapsed_ms, "product generation failed");
                self.log_lifecycle(
                    &ctx,
                    e.lifecycle_action(),
                    json!({
                        "runId": ctx.run.run_id,
                        "error": e.to_string(),
                        "elapsedMs": elapsed_ms,
                        "stages": ctx.journal.len(),
                    }),
                )
                .await;
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        ctx: &RunContext,
        request: &ProductRequest,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<PipelineOutcome, PipelineError> {
        let run_id = ctx.run_id();
        let mut degraded = Vec::new();

        // 1. Acquire
        let acquisition = self
            .tiering
            .acquire_batch(&request.images, &run_id, cancel)
            .await?;

        // 2. Process
        let images = self.process(ctx, &acquisition.refs, cancel).await?;
        let sources: Vec<String> = images.iter().map(|i| i.source.clone()).collect();

        // 3. Vision + search
        let (vision_raw, search_raw) = {
            let scope = cancel.child_token();
            let _timer = scope.cancel_after(self.config.group_timeout());
            let (vision, search) = tokio::join!(
                self.runner.run(
                    ctx,
                    VISION_ANALYSIS,
                    VisionRequest {
                        image_sources: sources.clone(),
                        image_count: sources.len(),
                        hints: request.hints.clone(),
                    },
                    &scope,
                ),
                self.runner.run(
                    ctx,
                    REVERSE_IMAGE_SEARCH,
                    SearchRequest {
                        image_sources: sources.clone(),
                        image_count: sources.len(),
                    },
                    &scope,
                ),
            );
            (
                substitute(vision, &mut degraded)?,
                substitute(search, &mut degraded)?,
            )
        };
        let search = StageOutput::<SearchFindings>::decode(&search_raw);

        // 4. Scrape
        let urls = search
            .known()
            .map(|s| s.candidate_urls(self.config.max_scrape_urls))
            .unwrap_or_default();
        let scraped_raw = if urls.is_empty() {
            tracing::debug!(run_id = %run_id, "no candidate pages, scrape skipped");
            empty_object()
        } else {
            let scraped = self
                .runner
                .run(ctx, WEB_SCRAPE, ScrapeRequest { urls }, cancel)
                .await;
            substitute(scraped, &mut degraded)?
        };

        // 5. Market
        let market = self
            .runner
            .run(
                ctx,
                MARKET_ANALYSIS,
                MarketRequest {
                    vision: vision_raw.clone(),
                    search: search_raw,
                    scraped: scraped_raw.clone(),
                    hints: request.hints.clone(),
                },
                cancel,
            )
            .await;
        let market_raw = substitute(market, &mut degraded)?;

        // 6. Audience + content
        let prompt_context = self.memory.prompt_context(&ctx.key).await;
        let (audience_raw, content_raw) = {
            let scope = cancel.child_token();
            let _timer = scope.cancel_after(self.config.group_timeout());
            let (audience, content) = tokio::join!(
                self.runner.run(
                    ctx,
                    AUDIENCE_DEFINITION,
                    AudienceRequest {
                        vision: vision_raw.clone(),
                        market: market_raw.clone(),
                        prompt_context: prompt_context.clone(),
                    },
                    &scope,
                ),
                self.runner.run(
                    ctx,
                    CONTENT_REFINEMENT,
                    ContentRequest {
                        vision: vision_raw.clone(),
                        market: market_raw.clone(),
                        hints: request.hints.clone(),
                        target_languages: self.config.target_languages.clone(),
                        prompt_context,
                    },
                    &scope,
                ),
            );
            (
                substitute(audience, &mut degraded)?,
                substitute(content, &mut degraded)?,
            )
        };

        // 7. Assemble
        let input = AssemblyInput {
            hints: request.hints.clone(),
            vision: StageOutput::decode(&vision_raw),
            scrape: StageOutput::decode(&scraped_raw),
            market: StageOutput::decode(&market_raw),
            audience: StageOutput::decode(&audience_raw),
            content: StageOutput::decode(&content_raw),
            images,
        };
        let draft = assemble(
            &input,
            &AssemblyDefaults {
                currency: self.config.default_currency.clone(),
                language: self.config.default_language.clone(),
            },
        );

        // 8. Finalize
        let journal = ctx.journal.snapshot();
        let report = PerformanceReport::from_records(ctx.run.run_id, &journal, elapsed_ms(started));
        self.log_lifecycle(
            ctx,
            COMPLETE_PRODUCT_GENERATION,
            json!({
                "runId": ctx.run.run_id,
                "title": draft.title,
                "degraded": degraded,
                "report": report,
            }),
        )
        .await;
        tracing::info!(
            run_id = %run_id,
            total_elapsed_ms = report.total_elapsed_ms,
            stages = journal.len(),
            degraded = degraded.len(),
            durable = acquisition.durable_count(),
            fallback = acquisition.fallback_count(),
            "product generation completed"
        );

        Ok(PipelineOutcome {
            run: ctx.run.clone(),
            draft,
            report,
            journal,
            acquisition,
            degraded,
        })
    }

    /// Process every artifact; failed items are dropped
    async fn process(
        &self,
        ctx: &RunContext,
        refs: &[ArtifactRef],
        cancel: &CancellationToken,
    ) -> Result<Vec<ImageRef>, PipelineError> {
        let mut images = Vec::with_capacity(refs.len());

        for (index, artifact) in refs.iter().enumerate() {
            let raw_source = match self.tiering.resolve(artifact).await {
                Ok(resolved) => resolved.image_source(),
                Err(e) => {
                    tracing::warn!(
                        run_id = %ctx.run.run_id,
                        locator = %artifact.locator,
                        error = %e,
                        "artifact unresolvable, dropped"
                    );
                    continue;
                }
            };

            let stage = format!("{}_{index}", PROCESS_IMAGE.name());
            let request = ProcessImageRequest {
                index,
                image_source: raw_source.clone(),
                content_type: artifact.content_type.clone(),
            };
            match self
                .runner
                .run_named(ctx, &stage, PROCESS_IMAGE, request, cancel)
                .await
            {
                Ok(run) => images.push(ImageRef {
                    id: artifact.locator.clone(),
                    tier: artifact.tier,
                    source: run
                        .output
                        .image_source
                        .filter(|s| !s.trim().is_empty())
                        .unwrap_or(raw_source),
                }),
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(run_id = %ctx.run.run_id, stage = %stage, error = %e, "image dropped");
                }
            }
        }

        if images.is_empty() {
            return Err(PipelineError::ProcessingExhausted {
                attempted: refs.len(),
            });
        }
        Ok(images)
    }

    async fn log_lifecycle(&self, ctx: &RunContext, action: &str, data: Value) {
        if let Err(e) = self.memory.append(&ctx.key, ActionEvent::new(action, data)).await {
            tracing::warn!(run_id = %ctx.run.run_id, action, error = %e, "lifecycle event not recorded");
        }
    }
}

/// Replace a recoverable stage failure with `{}`
fn substitute(
    result: Result<StageRun<Value>, StageError>,
    degraded: &mut Vec<String>,
) -> Result<Value, PipelineError> {
    match result {
        Ok(run) => Ok(run.output),
        Err(e) if e.is_fatal() => Err(e.into()),
        Err(e) => {
            if let Some(stage) = e.stage() {
                degraded.push(stage.to_string());
            }
            Ok(empty_object())
        }
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitute_degrades_recoverable_failures() {
        let mut degraded = Vec::new();
        let value = substitute(
            Err(StageError::Cancelled {
                stage: "VisionAnalysis".into(),
                elapsed_ms: 1,
            }),
            &mut degraded,
        )
        .unwrap();
        assert_eq!(value, json!({}));
        assert_eq!(degraded, vec!["VisionAnalysis"]);

        let ok = substitute(
            Ok(StageRun {
                output: json!({"a": 1}),
                elapsed_ms: 0,
            }),
            &mut degraded,
        )
        .unwrap();
        assert_eq!(ok, json!({"a": 1}));
        assert_eq!(degraded.len(), 1);
    }

    #[test]
    fn substitute_keeps_fatal_errors() {
        let err = substitute(
            Err(StageError::ToolNotFound {
                capability: "WebScrape".into(),
            }),
            &mut Vec::new(),
        )
        .unwrap_err();
        assert_eq!(err, PipelineError::ToolNotFound("WebScrape".into()));
    }
}
