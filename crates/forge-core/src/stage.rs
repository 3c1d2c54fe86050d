//! Stage runner
//!
//! Wraps one tool invocation with timing, lifecycle events and the stage
//! journal:
//! - `Started_<stage>` before the tool runs
//! - exactly one of `Completed_<stage>`, `Cancelled_<stage>`,
//!   `Errored_<stage>` afterwards
//!
//! Memory-log writes are best-effort. A broken audit log is logged locally
//! and never changes what the stage returns.

use crate::context::RunContext;
use crate::error::{StageError, ToolError};
use crate::registry::{Capability, ToolRegistry};
use forge_artifact::CancellationToken;
use forge_memory::{ActionEvent, MemoryLog};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;

/// Default bound on textual summaries stored in the memory log
pub const DEFAULT_SUMMARY_LIMIT: usize = 1000;

const SUMMARY_TRUNCATION_MARKER: &str = "...";

/// Terminal status of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageStatus {
    /// Running
    Started,
    /// Tool returned a result
    Completed,
    /// Cancellation reached the stage first
    Cancelled,
    /// Tool failed
    Errored,
}

impl StageStatus {
    /// Memory-log action prefix
    #[inline]
    #[must_use]
    pub fn action_prefix(self) -> &'static str {
        match self {
            Self::Started => "Started_",
            Self::Completed => "Completed_",
            Self::Cancelled => "Cancelled_",
            Self::Errored => "Errored_",
        }
    }

    /// Check if the stage has finished
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Started)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = self.action_prefix();
        f.write_str(&prefix[..prefix.len() - 1])
    }
}

/// Record of one attempted stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    /// Stage name
    pub name: String,
    /// Bounded summary of the input
    pub input_summary: Value,
    /// Terminal status
    pub status: StageStatus,
    /// Time spent in the tool
    pub elapsed_ms: u64,
    /// Bounded summary of the output, when completed
    pub output_summary: Option<Value>,
    /// Error message, when errored or cancelled
    pub error: Option<String>,
}

/// Per-run list of stage records, in completion order
#[derive(Debug, Default)]
pub struct StageJournal {
    records: Mutex<Vec<StageRecord>>,
}

impl StageJournal {
    /// Create empty journal
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a finished stage
    pub fn record(&self, record: StageRecord) {
        self.records.lock().push(record);
    }

    /// Copy of the records so far
    #[must_use]
    pub fn snapshot(&self) -> Vec<StageRecord> {
        self.records.lock().clone()
    }

    /// Number of recorded stages
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

/// Output of a completed stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageRun<O> {
    /// Tool output
    pub output: O,
    /// Time spent in the tool
    pub elapsed_ms: u64,
}

/// Runs tools as audited stages
#[derive(Clone)]
pub struct StageRunner {
    registry: Arc<ToolRegistry>,
    memory: Arc<MemoryLog>,
    summary_limit: usize,
}

impl fmt::Debug for StageRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageRunner")
            .field("registry", &self.registry)
            .field("summary_limit", &self.summary_limit)
            .finish_non_exhaustive()
    }
}

impl StageRunner {
    /// Create runner
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, memory: Arc<MemoryLog>) -> Self {
        Self {
            registry,
            memory,
            summary_limit: DEFAULT_SUMMARY_LIMIT,
        }
    }

    /// With summary bound
    #[inline]
    #[must_use]
    pub fn with_summary_limit(mut self, limit: usize) -> Self {
        self.summary_limit = limit;
        self
    }

    /// Run `capability` as the stage of the same name
    ///
    /// # Errors
    /// See [`StageRunner::run_named`].
    pub async fn run<I, O>(
        &self,
        ctx: &RunContext,
        capability: Capability<I, O>,
        input: I,
        cancel: &CancellationToken,
    ) -> Result<StageRun<O>, StageError>
    where
        I: Serialize + Send + 'static,
        O: Serialize + Send + 'static,
    {
        self.run_named(ctx, capability.name(), capability, input, cancel)
            .await
    }

    /// Run `capability` as stage `stage`
    ///
    /// # Errors
    /// - `StageError::ToolNotFound` if the capability is not registered;
    ///   no events are written
    /// - `StageError::Cancelled` if `cancel` fired first
    /// - `StageError::Execution` if the tool failed
    pub async fn run_named<I, O>(
        &self,
        ctx: &RunContext,
        stage: &str,
        capability: Capability<I, O>,
        input: I,
        cancel: &CancellationToken,
    ) -> Result<StageRun<O>, StageError>
    where
        I: Serialize + Send + 'static,
        O: Serialize + Send + 'static,
    {
        let tool = match self.registry.resolve(capability) {
            Ok(tool) => tool,
            Err(e) => {
                tracing::error!(run_id = %ctx.run.run_id, stage, error = %e, "stage tool missing");
                return Err(e);
            }
        };

        let input_summary = summarize(&input, self.summary_limit);
        self.log_event(
            ctx,
            stage,
            StageStatus::Started,
            json!({ "stage": stage, "input": input_summary }),
        )
        .await;
        tracing::debug!(run_id = %ctx.run.run_id, stage, "stage started");

        let started = Instant::now();
        let outcome = if cancel.is_cancelled() {
            None
        } else {
            cancel.run_until_cancelled(tool.invoke(input, cancel)).await
        };
        let elapsed_ms = elapsed_ms(started);

        let mut record = StageRecord {
            name: stage.to_string(),
            input_summary,
            status: StageStatus::Completed,
            elapsed_ms,
            output_summary: None,
            error: None,
        };

        let result = match outcome {
            Some(Ok(output)) => {
                let summary = summarize(&output, self.summary_limit);
                self.log_event(
                    ctx,
                    stage,
                    StageStatus::Completed,
                    json!({ "stage": stage, "elapsedMs": elapsed_ms, "output": summary }),
                )
                .await;
                tracing::info!(run_id = %ctx.run.run_id, stage, elapsed_ms, "stage completed");
                record.output_summary = Some(summary);
                Ok(StageRun { output, elapsed_ms })
            }
            None | Some(Err(ToolError::Cancelled)) => {
                self.log_event(
                    ctx,
                    stage,
                    StageStatus::Cancelled,
                    json!({ "stage": stage, "elapsedMs": elapsed_ms }),
                )
                .await;
                tracing::warn!(run_id = %ctx.run.run_id, stage, elapsed_ms, "stage cancelled");
                record.status = StageStatus::Cancelled;
                record.error = Some("cancelled".to_string());
                Err(StageError::Cancelled {
                    stage: stage.to_string(),
                    elapsed_ms,
                })
            }
            Some(Err(cause)) => {
                let message = cause.to_string();
                self.log_event(
                    ctx,
                    stage,
                    StageStatus::Errored,
                    json!({ "stage": stage, "elapsedMs": elapsed_ms, "error": message }),
                )
                .await;
                tracing::warn!(run_id = %ctx.run.run_id, stage, elapsed_ms, error = %message, "stage failed");
                record.status = StageStatus::Errored;
                record.error = Some(message);
                Err(StageError::Execution {
                    stage: stage.to_string(),
                    cause,
                })
            }
        };

        ctx.journal.record(record);
        result
    }

    async fn log_event(&self, ctx: &RunContext, stage: &str, status: StageStatus, data: Value) {
        let action = format!("{}{stage}", status.action_prefix());
        if let Err(e) = self
            .memory
            .append(&ctx.key, ActionEvent::new(action.as_str(), data))
            .await
        {
            tracing::warn!(
                run_id = %ctx.run.run_id,
                action = %action,
                error = %e,
                "stage event not recorded"
            );
        }
    }
}

/// Milliseconds since `started`
pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Bounded JSON summary of a stage payload
///
/// Payloads whose text form exceeds `limit` characters are replaced by a
/// prefix of that text.
#[must_use]
pub fn summarize<T: Serialize>(payload: &T, limit: usize) -> Value {
    let value = match serde_json::to_value(payload) {
        Ok(value) => value,
        Err(e) => return Value::String(format!("<unserializable: {e}>")),
    };
    let text = match &value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    match text.char_indices().nth(limit) {
        Some((cut, _)) => Value::String(format!("{}{SUMMARY_TRUNCATION_MARKER}", &text[..cut])),
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PipelineRun;
    use crate::registry::{FnTool, Tool};
    use forge_memory::MemoryKey;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const ECHO: Capability<String, String> = Capability::new("Echo");
    const FAIL: Capability<String, String> = Capability::new("Fail");
    const HANG: Capability<String, String> = Capability::new("Hang");
    const GHOST: Capability<String, String> = Capability::new("Ghost");

    fn registry() -> Arc<ToolRegistry> {
        let echo: Arc<dyn Tool<String, String>> =
            Arc::new(FnTool::new(|input: String, _cancel: CancellationToken| async move {
                Ok::<_, ToolError>(input)
            }));
        let fail: Arc<dyn Tool<String, String>> =
            Arc::new(FnTool::new(|_input: String, _cancel: CancellationToken| async move {
                Err::<String, _>(ToolError::failed("boom"))
            }));
        let hang: Arc<dyn Tool<String, String>> =
            Arc::new(FnTool::new(|_input: String, _cancel: CancellationToken| async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<_, ToolError>(String::new())
            }));
        Arc::new(
            ToolRegistry::new()
                .with(ECHO, echo)
                .with(FAIL, fail)
                .with(HANG, hang),
        )
    }

    fn setup() -> (StageRunner, Arc<MemoryLog>, RunContext) {
        let memory = Arc::new(MemoryLog::in_memory());
        let runner = StageRunner::new(registry(), memory.clone());
        let ctx = RunContext::new(PipelineRun::start(&MemoryKey::new("u", "c")));
        (runner, memory, ctx)
    }

    async fn actions(memory: &MemoryLog, ctx: &RunContext) -> Vec<String> {
        memory
            .get_memory(&ctx.key)
            .await
            .map(|r| r.events.into_iter().map(|e| e.action).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn completed_stage_logs_start_and_completion() {
        let (runner, memory, ctx) = setup();
        let run = runner
            .run(&ctx, ECHO, "lamp".to_string(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(run.output, "lamp");
        assert_eq!(actions(&memory, &ctx).await, vec!["Started_Echo", "Completed_Echo"]);

        let journal = ctx.journal.snapshot();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal[0].status, StageStatus::Completed);
        assert_eq!(journal[0].output_summary, Some(json!("lamp")));
    }

    #[tokio::test]
    async fn failed_stage_wraps_cause() {
        let (runner, memory, ctx) = setup();
        let err = runner
            .run(&ctx, FAIL, "x".to_string(), &CancellationToken::new())
            .await
            .err()
            .unwrap();

        assert_eq!(
            err,
            StageError::Execution {
                stage: "Fail".into(),
                cause: ToolError::failed("boom")
            }
        );
        assert_eq!(actions(&memory, &ctx).await, vec!["Started_Fail", "Errored_Fail"]);
        assert_eq!(ctx.journal.snapshot()[0].status, StageStatus::Errored);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_stage_is_reported_to_caller() {
        let (runner, memory, ctx) = setup();
        let cancel = CancellationToken::new();
        let _guard = cancel.cancel_after(Duration::from_secs(5));

        let err = runner
            .run(&ctx, HANG, "x".to_string(), &cancel)
            .await
            .err()
            .unwrap();

        assert!(err.is_cancellation());
        assert_eq!(actions(&memory, &ctx).await, vec!["Started_Hang", "Cancelled_Hang"]);
        assert!(ctx.journal.snapshot()[0].elapsed_ms >= 5000);
    }

    #[tokio::test]
    async fn missing_tool_writes_nothing() {
        let (runner, memory, ctx) = setup();
        let err = runner
            .run(&ctx, GHOST, "x".to_string(), &CancellationToken::new())
            .await
            .err()
            .unwrap();
        assert!(err.is_fatal());
        assert!(actions(&memory, &ctx).await.is_empty());
        assert!(ctx.journal.is_empty());
    }

    #[tokio::test]
    async fn long_output_summary_is_truncated() {
        let (runner, memory, ctx) = setup();
        let runner = runner.with_summary_limit(10);
        let long = "y".repeat(50);

        let run = runner
            .run(&ctx, ECHO, long.clone(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(run.output, long);

        let record = memory.get_memory(&ctx.key).await.unwrap();
        let completed = record.last_event().unwrap();
        assert_eq!(completed.data["output"], json!("yyyyyyyyyy..."));
    }

    #[test]
    fn summaries_keep_small_structured_values() {
        let value = json!({"productName": "Lamp"});
        assert_eq!(summarize(&value, 1000), value);

        let truncated = summarize(&value, 5);
        assert_eq!(truncated, json!("{\"pro..."));
    }

    #[test]
    fn status_display_and_prefix() {
        assert_eq!(StageStatus::Cancelled.to_string(), "Cancelled");
        assert_eq!(StageStatus::Errored.action_prefix(), "Errored_");
        assert!(!StageStatus::Started.is_terminal());
        assert!(StageStatus::Completed.is_terminal());
    }
}
