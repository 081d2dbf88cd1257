//! Execution events and their aggregation into per-run metrics.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::{ExecutionStatus, StageName};

/// What happened to one stage attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    /// Gated stage passed its threshold.
    Advanced,
    /// Advisory stage completed.
    Accepted,
    RetryRequested,
    Escalated,
    /// Infrastructure failure.
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    RunStarted {
        planned_stages: Vec<StageName>,
        skipped_stages: Vec<StageName>,
        baseline_stages: usize,
    },
    Stage {
        stage: StageName,
        attempt: u32,
        duration_ms: u64,
        outcome: StageOutcome,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quality_score: Option<f64>,
    },
    RunFinished {
        status: ExecutionStatus,
        duration_ms: u64,
    },
}

/// One line of the durable metrics log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub execution_id: String,
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl ExecutionEvent {
    pub fn now(execution_id: &str, kind: EventKind) -> Self {
        Self {
            execution_id: execution_id.to_string(),
            recorded_at: Utc::now(),
            kind,
        }
    }
}

/// Aggregated view of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub total_duration_ms: u64,
    pub stage_attempts: u32,
    pub retry_count: u32,
    pub skipped_stage_count: usize,
    /// Active stages of the accepted plan, whether or not they ran.
    pub planned_stage_count: usize,
    pub executed_stage_count: usize,
    pub baseline_stage_count: usize,
    pub stages_saved: usize,
    pub savings_ratio: f64,
    pub estimated_time_saved_ms: u64,
}

/// Summarize the events of `execution_id`. Events of other executions are
/// ignored; `None` if there are none for this id.
///
/// Savings compare the planned stage count against the baseline carried by
/// `run_started`, so a run that stops early does not inflate them. Without a
/// `run_started` event the executed stages stand in for the plan. A
/// `run_started` naming no stages at all marks a rejected plan, which saves
/// nothing.
pub fn summarize_events(execution_id: &str, events: &[ExecutionEvent]) -> Option<Metrics> {
    let mut seen_any = false;
    let mut status = ExecutionStatus::Running;
    let mut total_duration_ms = 0;
    let mut baseline_stage_count = StageName::ORDER.len();
    let mut planned: Option<usize> = None;
    let mut plan_rejected = false;
    let mut stage_attempts = 0u32;
    let mut retry_count = 0u32;
    let mut stage_time_ms = 0u64;
    let mut executed = BTreeSet::new();
    let mut skipped = BTreeSet::new();

    for event in events.iter().filter(|event| event.execution_id == execution_id) {
        seen_any = true;
        match &event.kind {
            EventKind::RunStarted {
                planned_stages,
                skipped_stages,
                baseline_stages,
            } => {
                baseline_stage_count = *baseline_stages;
                plan_rejected = planned_stages.is_empty() && skipped_stages.is_empty();
                planned = Some(planned_stages.len());
            }
            EventKind::Stage {
                stage,
                duration_ms,
                outcome,
                ..
            } => {
                if *outcome == StageOutcome::Skipped {
                    skipped.insert(*stage);
                    continue;
                }
                stage_attempts += 1;
                stage_time_ms = stage_time_ms.saturating_add(*duration_ms);
                executed.insert(*stage);
                if *outcome == StageOutcome::RetryRequested {
                    retry_count += 1;
                }
            }
            EventKind::RunFinished {
                status: finished,
                duration_ms,
            } => {
                status = *finished;
                total_duration_ms = *duration_ms;
            }
        }
    }

    if !seen_any {
        return None;
    }

    let executed_stage_count = executed.len();
    let planned_stage_count = planned.unwrap_or(executed_stage_count);
    let stages_saved = if plan_rejected {
        0
    } else {
        baseline_stage_count.saturating_sub(planned_stage_count)
    };
    let savings_ratio = if baseline_stage_count == 0 {
        0.0
    } else {
        stages_saved as f64 / baseline_stage_count as f64
    };
    let estimated_time_saved_ms = if executed_stage_count == 0 {
        0
    } else {
        (stage_time_ms / executed_stage_count as u64).saturating_mul(stages_saved as u64)
    };

    Some(Metrics {
        execution_id: execution_id.to_string(),
        status,
        total_duration_ms,
        stage_attempts,
        retry_count,
        skipped_stage_count: skipped.len(),
        planned_stage_count,
        executed_stage_count,
        baseline_stage_count,
        stages_saved,
        savings_ratio,
        estimated_time_saved_ms,
    })
}
