//! Pipeline executor: runs a [`StagePlan`] stage by stage.
//!
//! State machine per run: `Running -> Succeeded | Failed | Aborted`. Stages
//! run strictly in plan order. A gated stage that misses its threshold is
//! retried with feedback until it passes or exhausts
//! `max_retries_per_stage`. Cancellation and the run deadline are checked
//! only between stage attempts. [`PipelineExecutor::run`] never fails; every
//! termination produces a complete [`WorkflowResult`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::agents::feedback::{FeedbackRenderer, RetryFeedback};
use crate::agents::{StageAgentRegistry, StageContext};
use crate::core::budget::{deadline_expired, remaining_budget};
use crate::core::gate::{GateAction, QualityGateDecision, clamp_score, decide};
use crate::core::metrics::{EventKind, ExecutionEvent, Metrics, StageOutcome};
use crate::core::plan::{StagePlan, StageSpec, validate_plan};
use crate::core::selector::DEFAULT_THRESHOLD;
use crate::core::types::{ArtifactRef, ExecutionStatus, StageName, StageStatus};
use crate::metrics::MetricsTracker;

pub use crate::core::gate::RetryLimits;

/// Record of one stage attempt. Appended, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: StageName,
    pub artifact: Option<ArtifactRef>,
    pub quality_score: Option<f64>,
    pub status: StageStatus,
    /// 1-based; 0 for skipped stages.
    pub attempt: u32,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<QualityGateDecision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

/// Final outcome of one `run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub completed_stages: Vec<StageResult>,
    pub metrics: Metrics,
}

impl WorkflowResult {
    /// Result with no stage records and zeroed metrics.
    pub fn empty(execution_id: &str, status: ExecutionStatus) -> Self {
        Self {
            execution_id: execution_id.to_string(),
            status,
            completed_stages: Vec::new(),
            metrics: zero_metrics(execution_id, status, 0),
        }
    }

    /// Results recorded for `stage`, in attempt order.
    pub fn results_for(&self, stage: StageName) -> Vec<&StageResult> {
        self.completed_stages
            .iter()
            .filter(|result| result.stage == stage)
            .collect()
    }
}

/// Mutable state of one run. Owned by a single `run` call.
#[derive(Debug)]
pub struct WorkflowExecution<'a> {
    pub execution_id: String,
    pub plan: &'a StagePlan,
    pub completed_stages: Vec<StageResult>,
    pub current_stage_index: usize,
    pub retry_counts: BTreeMap<StageName, u32>,
    pub status: ExecutionStatus,
    accepted: BTreeMap<StageName, ArtifactRef>,
    deadline: Option<Instant>,
}

impl<'a> WorkflowExecution<'a> {
    fn new(execution_id: String, plan: &'a StagePlan, deadline: Option<Instant>) -> Self {
        Self {
            execution_id,
            plan,
            completed_stages: Vec::new(),
            current_stage_index: 0,
            retry_counts: BTreeMap::new(),
            status: ExecutionStatus::Running,
            accepted: BTreeMap::new(),
            deadline,
        }
    }
}

/// How a stage left the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageFlow {
    Advanced,
    Failed,
    Aborted,
}

/// Outcome of one stage attempt before it is recorded.
struct AttemptRecord {
    status: StageStatus,
    outcome: StageOutcome,
    artifact: Option<ArtifactRef>,
    quality_score: Option<f64>,
    gate: Option<QualityGateDecision>,
    error: Option<String>,
}

/// Runs stage plans against a registry of stage agents.
///
/// Holds no per-run state, so one executor can serve concurrent runs.
pub struct PipelineExecutor {
    registry: StageAgentRegistry,
    limits: RetryLimits,
    metrics: Arc<MetricsTracker>,
    run_timeout: Option<Duration>,
    feedback: FeedbackRenderer,
}

impl PipelineExecutor {
    pub fn new(
        registry: StageAgentRegistry,
        limits: RetryLimits,
        metrics: Arc<MetricsTracker>,
    ) -> Self {
        Self {
            registry,
            limits,
            metrics,
            run_timeout: None,
            feedback: FeedbackRenderer::new(),
        }
    }

    /// Abort runs that exceed `timeout`, checked between stages.
    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn metrics(&self) -> &Arc<MetricsTracker> {
        &self.metrics
    }

    /// Run `plan` for `task` under a freshly generated execution id.
    pub async fn run(
        &self,
        task: &str,
        plan: &StagePlan,
        cancel: CancellationToken,
    ) -> WorkflowResult {
        self.run_with_id(new_execution_id(), task, plan, cancel).await
    }

    #[instrument(skip_all, fields(execution_id = %execution_id, preset = %plan.preset))]
    pub async fn run_with_id(
        &self,
        execution_id: String,
        task: &str,
        plan: &StagePlan,
        cancel: CancellationToken,
    ) -> WorkflowResult {
        let started = Instant::now();
        let deadline = self
            .run_timeout
            .and_then(|timeout| started.checked_add(timeout));
        let mut execution = WorkflowExecution::new(execution_id, plan, deadline);

        let errors = validate_plan(plan);
        if !errors.is_empty() {
            warn!(errors = %errors.join("; "), "invalid stage plan");
            self.emit(&execution.execution_id, run_started_kind(None)).await;
            execution.status = ExecutionStatus::Failed;
            return self.finish(execution, started).await;
        }

        info!(
            active = ?plan.active_names(),
            skipped = ?plan.skipped_names(),
            "run started"
        );
        self.emit(&execution.execution_id, run_started_kind(Some(plan)))
            .await;

        for (index, spec) in plan.stages.iter().enumerate() {
            execution.current_stage_index = index;
            if let Some(reason) = &spec.skip_reason {
                self.record_skip(&mut execution, spec, reason).await;
                continue;
            }
            match self.run_stage(&mut execution, spec, task, &cancel).await {
                StageFlow::Advanced => {}
                StageFlow::Failed => {
                    execution.status = ExecutionStatus::Failed;
                    break;
                }
                StageFlow::Aborted => {
                    execution.status = ExecutionStatus::Aborted;
                    break;
                }
            }
        }

        if execution.status == ExecutionStatus::Running {
            execution.status = ExecutionStatus::Succeeded;
        }
        self.finish(execution, started).await
    }

    /// Drive one stage through its attempts until it advances, fails or is aborted.
    async fn run_stage(
        &self,
        execution: &mut WorkflowExecution<'_>,
        spec: &StageSpec,
        task: &str,
        cancel: &CancellationToken,
    ) -> StageFlow {
        let mut feedback: Option<String> = None;
        loop {
            if cancel.is_cancelled() {
                info!(stage = %spec.name, "run cancelled");
                return StageFlow::Aborted;
            }
            let now = Instant::now();
            if deadline_expired(execution.deadline, now) {
                warn!(stage = %spec.name, "run deadline reached");
                return StageFlow::Aborted;
            }

            let attempt = execution.retry_counts.get(&spec.name).copied().unwrap_or(0) + 1;
            let context = StageContext {
                execution_id: execution.execution_id.clone(),
                stage: spec.name,
                task_description: task.to_string(),
                prior_artifacts: execution.accepted.clone(),
                mode: spec.mode,
                feedback: feedback.take(),
                attempt,
                soft_timeout: remaining_budget(execution.deadline, now),
            };

            let attempt_started = Instant::now();
            let invoked = match self.registry.get(spec.name) {
                Some(agent) => agent.invoke(&context).await,
                None => Err(anyhow::anyhow!("no agent registered for stage {}", spec.name)),
            };
            let duration_ms = elapsed_ms(attempt_started);

            let record = match invoked {
                Err(err) => {
                    warn!(stage = %spec.name, attempt, err = %format!("{err:#}"), "stage agent failed");
                    AttemptRecord {
                        status: StageStatus::Failed,
                        outcome: StageOutcome::Failed,
                        artifact: None,
                        quality_score: None,
                        gate: None,
                        error: Some(format!("{err:#}")),
                    }
                }
                Ok(output) if spec.gated => {
                    let score = clamp_score(output.quality_score);
                    let threshold = spec.threshold.unwrap_or(DEFAULT_THRESHOLD);
                    let decision =
                        decide(score, threshold, attempt, self.limits.max_retries_per_stage);
                    debug!(stage = %spec.name, attempt, score, threshold, action = ?decision.action, "gate decision");
                    let (status, outcome) = match decision.action {
                        GateAction::Advance => (StageStatus::Success, StageOutcome::Advanced),
                        GateAction::RetryStage => (StageStatus::Failed, StageOutcome::RetryRequested),
                        GateAction::Escalate => (StageStatus::Failed, StageOutcome::Escalated),
                    };
                    AttemptRecord {
                        status,
                        outcome,
                        artifact: Some(output.artifact),
                        quality_score: Some(score),
                        gate: Some(decision),
                        error: None,
                    }
                }
                Ok(output) => AttemptRecord {
                    status: StageStatus::Success,
                    outcome: StageOutcome::Accepted,
                    artifact: Some(output.artifact),
                    quality_score: output.quality_score.map(|score| clamp_score(Some(score))),
                    gate: None,
                    error: None,
                },
            };

            let outcome = record.outcome;
            let artifact = record.artifact.clone();
            let gate = record.gate;
            self.record_attempt(execution, spec.name, attempt, duration_ms, record)
                .await;

            match outcome {
                StageOutcome::Advanced | StageOutcome::Accepted => {
                    if let Some(artifact) = artifact {
                        execution.accepted.insert(spec.name, artifact);
                    }
                    execution.retry_counts.remove(&spec.name);
                    return StageFlow::Advanced;
                }
                StageOutcome::RetryRequested => {
                    *execution.retry_counts.entry(spec.name).or_insert(0) += 1;
                    if let Some(decision) = gate {
                        feedback = Some(self.render_feedback(
                            spec.name,
                            attempt,
                            &decision,
                            artifact.as_ref(),
                        ));
                    }
                }
                StageOutcome::Escalated => {
                    warn!(stage = %spec.name, attempt, "quality gate exhausted retries");
                    return StageFlow::Failed;
                }
                StageOutcome::Failed if spec.best_effort => {
                    info!(stage = %spec.name, "best-effort stage failed; continuing");
                    return StageFlow::Advanced;
                }
                StageOutcome::Failed | StageOutcome::Skipped => return StageFlow::Failed,
            }
        }
    }

    async fn record_attempt(
        &self,
        execution: &mut WorkflowExecution<'_>,
        stage: StageName,
        attempt: u32,
        duration_ms: u64,
        record: AttemptRecord,
    ) {
        execution.completed_stages.push(StageResult {
            stage,
            artifact: record.artifact,
            quality_score: record.quality_score,
            status: record.status,
            attempt,
            duration_ms,
            gate: record.gate,
            error: record.error,
            skip_reason: None,
        });
        self.emit(
            &execution.execution_id,
            EventKind::Stage {
                stage,
                attempt,
                duration_ms,
                outcome: record.outcome,
                quality_score: record.quality_score,
            },
        )
        .await;
    }

    async fn record_skip(&self, execution: &mut WorkflowExecution<'_>, spec: &StageSpec, reason: &str) {
        debug!(stage = %spec.name, reason, "stage skipped");
        execution.completed_stages.push(StageResult {
            stage: spec.name,
            artifact: None,
            quality_score: None,
            status: StageStatus::Skipped,
            attempt: 0,
            duration_ms: 0,
            gate: None,
            error: None,
            skip_reason: Some(reason.to_string()),
        });
        self.emit(
            &execution.execution_id,
            EventKind::Stage {
                stage: spec.name,
                attempt: 0,
                duration_ms: 0,
                outcome: StageOutcome::Skipped,
                quality_score: None,
            },
        )
        .await;
    }

    fn render_feedback(
        &self,
        stage: StageName,
        attempt: u32,
        decision: &QualityGateDecision,
        artifact: Option<&ArtifactRef>,
    ) -> String {
        let input = RetryFeedback {
            stage,
            attempt,
            decision,
            artifact,
            max_retries: self.limits.max_retries_per_stage,
        };
        self.feedback.render(&input).unwrap_or_else(|err| {
            warn!(err = %err, "failed to render retry feedback");
            FeedbackRenderer::fallback(&input)
        })
    }

    async fn finish(&self, execution: WorkflowExecution<'_>, started: Instant) -> WorkflowResult {
        let duration_ms = elapsed_ms(started);
        info!(status = ?execution.status, duration_ms, stages = execution.completed_stages.len(), "run finished");
        self.emit(
            &execution.execution_id,
            EventKind::RunFinished {
                status: execution.status,
                duration_ms,
            },
        )
        .await;
        let metrics = self
            .metrics
            .take_summary(&execution.execution_id)
            .unwrap_or_else(|| zero_metrics(&execution.execution_id, execution.status, duration_ms));
        WorkflowResult {
            execution_id: execution.execution_id,
            status: execution.status,
            completed_stages: execution.completed_stages,
            metrics,
        }
    }

    async fn emit(&self, execution_id: &str, kind: EventKind) {
        self.metrics
            .record(ExecutionEvent::now(execution_id, kind))
            .await;
    }
}

fn run_started_kind(plan: Option<&StagePlan>) -> EventKind {
    EventKind::RunStarted {
        planned_stages: plan.map(StagePlan::active_names).unwrap_or_default(),
        skipped_stages: plan.map(StagePlan::skipped_names).unwrap_or_default(),
        baseline_stages: StageName::ORDER.len(),
    }
}

fn zero_metrics(execution_id: &str, status: ExecutionStatus, duration_ms: u64) -> Metrics {
    Metrics {
        execution_id: execution_id.to_string(),
        status,
        total_duration_ms: duration_ms,
        stage_attempts: 0,
        retry_count: 0,
        skipped_stage_count: 0,
        planned_stage_count: 0,
        executed_stage_count: 0,
        baseline_stage_count: StageName::ORDER.len(),
        stages_saved: 0,
        savings_ratio: 0.0,
        estimated_time_saved_ms: 0,
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// `exec-<UTC yyyymmdd_HHMMSS>-<6 lowercase alphanumerics>`.
pub fn new_execution_id() -> String {
    format!(
        "exec-{}-{}",
        Utc::now().format("%Y%m%d_%H%M%S"),
        generate_short_id()
    )
}

fn generate_short_id() -> String {
    let mut rng = rand::thread_rng();
    std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(6)
        .collect::<String>()
        .to_lowercase()
}
