//! Performance report of a run

use crate::context::RunId;
use crate::stage::{StageRecord, StageStatus};
use serde::{Deserialize, Serialize};

/// Timing of one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTiming {
    /// Stage name
    pub stage: String,
    /// Time spent in the tool
    pub elapsed_ms: u64,
    /// Terminal status
    pub status: StageStatus,
}

/// Stage name → elapsed time, in the order stages finished
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    /// Run the report belongs to
    pub run_id: RunId,
    /// Per-stage timings
    pub stages: Vec<StageTiming>,
    /// Wall-clock time of the whole run
    pub total_elapsed_ms: u64,
    /// Stages that completed
    pub completed: usize,
    /// Stages that were cancelled
    pub cancelled: usize,
    /// Stages that failed
    pub errored: usize,
}

impl PerformanceReport {
    /// Build from the stage journal
    #[must_use]
    pub fn from_records(run_id: RunId, records: &[StageRecord], total_elapsed_ms: u64) -> Self {
        let count = |status| records.iter().filter(|r| r.status == status).count();
        Self {
            run_id,
            stages: records
                .iter()
                .map(|r| StageTiming {
                    stage: r.name.clone(),
                    elapsed_ms: r.elapsed_ms,
                    status: r.status,
                })
                .collect(),
            total_elapsed_ms,
            completed: count(StageStatus::Completed),
            cancelled: count(StageStatus::Cancelled),
            errored: count(StageStatus::Errored),
        }
    }

    /// Elapsed time of `stage`, if it ran
    #[must_use]
    pub fn elapsed_of(&self, stage: &str) -> Option<u64> {
        self.stages
            .iter()
            .find(|t| t.stage == stage)
            .map(|t| t.elapsed_ms)
    }

    /// Summed tool time across stages
    #[must_use]
    pub fn stage_time_ms(&self) -> u64 {
        self.stages.iter().map(|t| t.elapsed_ms).sum()
    }
}
