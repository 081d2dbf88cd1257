//! End-to-end pipeline scenarios against a durable metrics log.
//!
//! Each test drives `PipelineExecutor` with scripted agents and checks both
//! the returned `WorkflowResult` and the events persisted to disk.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use conductor::agents::StageAgentRegistry;
use conductor::core::gate::{GateAction, RetryLimits};
use conductor::core::metrics::{EventKind, ExecutionEvent, StageOutcome, summarize_events};
use conductor::core::types::{ExecutionStatus, StageName, StageStatus};
use conductor::io::metrics_log::{MetricsLog, load_events};
use conductor::metrics::MetricsTracker;
use conductor::pipeline::PipelineExecutor;
use conductor::test_support::{CancellingAgent, FailingAgent, ScriptedAgent, gated_plan};

async fn durable_tracker(path: &std::path::Path) -> Arc<MetricsTracker> {
    let log = MetricsLog::open(path).await.expect("open metrics log");
    Arc::new(MetricsTracker::with_log(log))
}

fn stage_outcomes(events: &[ExecutionEvent], stage: StageName) -> Vec<StageOutcome> {
    events
        .iter()
        .filter_map(|event| match &event.kind {
            EventKind::Stage {
                stage: recorded,
                outcome,
                ..
            } if *recorded == stage => Some(*outcome),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn retry_then_pass_is_persisted() {
    let temp = tempfile::tempdir().expect("tempdir");
    let log_path = temp.path().join("metrics.jsonl");
    let tracker = durable_tracker(&log_path).await;
    let registry =
        StageAgentRegistry::new().with(StageName::Implement, ScriptedAgent::scores([60.0, 80.0]));
    let executor = PipelineExecutor::new(
        registry,
        RetryLimits {
            max_retries_per_stage: 2,
        },
        tracker.clone(),
    );

    let result = executor
        .run(
            "Add rate limiting to the login endpoint",
            &gated_plan(&[StageName::Implement], 75.0),
            CancellationToken::new(),
        )
        .await;
    tracker.flush().await.expect("flush");

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert_eq!(result.results_for(StageName::Implement).len(), 2);

    let events = load_events(&log_path).expect("load events");
    assert_eq!(
        stage_outcomes(&events, StageName::Implement),
        vec![StageOutcome::RetryRequested, StageOutcome::Advanced]
    );
    let metrics = summarize_events(&result.execution_id, &events).expect("metrics");
    assert_eq!(metrics, result.metrics);
    assert_eq!(metrics.retry_count, 1);
    assert_eq!(metrics.stage_attempts, 2);
}

#[tokio::test]
async fn exhausted_retries_record_escalation() {
    let registry =
        StageAgentRegistry::new().with(StageName::Implement, ScriptedAgent::scores([60.0, 60.0]));
    let temp = tempfile::tempdir().expect("tempdir");
    let log_path = temp.path().join("metrics.jsonl");
    let tracker = durable_tracker(&log_path).await;
    let executor = PipelineExecutor::new(
        registry,
        RetryLimits {
            max_retries_per_stage: 1,
        },
        tracker.clone(),
    );

    let result = executor
        .run(
            "task",
            &gated_plan(&[StageName::Implement], 75.0),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    let implement = result.results_for(StageName::Implement);
    assert_eq!(implement.len(), 2);
    assert_eq!(
        implement[1].gate.as_ref().map(|gate| gate.action),
        Some(GateAction::Escalate)
    );
    tracker.flush().await.expect("flush");
    assert_eq!(
        stage_outcomes(&load_events(&log_path).expect("load events"), StageName::Implement),
        vec![StageOutcome::RetryRequested, StageOutcome::Escalated]
    );
    assert_eq!(tracker.tracked_executions(), 0);
}

#[tokio::test]
async fn infrastructure_failure_is_not_retried() {
    let agent = FailingAgent::new("connection refused");
    let registry = StageAgentRegistry::new().with(StageName::Implement, agent.clone());
    let executor = PipelineExecutor::new(
        registry,
        RetryLimits::default(),
        Arc::new(MetricsTracker::in_memory()),
    );

    let result = executor
        .run(
            "task",
            &gated_plan(&[StageName::Implement, StageName::Test], 75.0),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(agent.calls(), 1);
    let implement = result.results_for(StageName::Implement);
    assert_eq!(implement.len(), 1);
    assert_eq!(implement[0].status, StageStatus::Failed);
    assert!(
        implement[0]
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("connection refused")
    );
    assert!(result.results_for(StageName::Test).is_empty());
    assert_eq!(result.metrics.retry_count, 0);
}

#[tokio::test]
async fn cancellation_mid_run_keeps_partial_results() {
    let cancel = CancellationToken::new();
    let test_agent = ScriptedAgent::scores([90.0]);
    let registry = StageAgentRegistry::new()
        .with(StageName::Implement, CancellingAgent::new(cancel.clone(), 90.0))
        .with(StageName::Test, test_agent.clone());
    let executor = PipelineExecutor::new(
        registry,
        RetryLimits::default(),
        Arc::new(MetricsTracker::in_memory()),
    );

    let result = executor
        .run(
            "task",
            &gated_plan(&[StageName::Implement, StageName::Test], 75.0),
            cancel,
        )
        .await;

    assert_eq!(result.status, ExecutionStatus::Aborted);
    assert_eq!(
        result.results_for(StageName::Implement)[0].status,
        StageStatus::Success
    );
    assert!(result.results_for(StageName::Test).is_empty());
    assert_eq!(test_agent.calls(), 0);
}

#[tokio::test]
async fn concurrent_runs_share_one_log() {
    const RUNS: usize = 6;
    // run_started, seven skips, implement twice, test once, run_finished.
    const EVENTS_PER_RUN: usize = 12;
    let temp = tempfile::tempdir().expect("tempdir");
    let log_path = temp.path().join("metrics.jsonl");
    let tracker = durable_tracker(&log_path).await;

    let mut handles = Vec::new();
    for _ in 0..RUNS {
        let tracker = tracker.clone();
        handles.push(tokio::spawn(async move {
            let registry = StageAgentRegistry::new()
                .with(StageName::Implement, ScriptedAgent::scores([50.0, 90.0]))
                .with(StageName::Test, ScriptedAgent::scores([85.0]));
            let executor = PipelineExecutor::new(registry, RetryLimits::default(), tracker);
            executor
                .run(
                    "task",
                    &gated_plan(&[StageName::Implement, StageName::Test], 75.0),
                    CancellationToken::new(),
                )
                .await
        }));
    }
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.expect("join"));
    }
    tracker.flush().await.expect("flush");

    let events = load_events(&log_path).expect("load events");
    let mut per_run: BTreeMap<&str, usize> = BTreeMap::new();
    for event in &events {
        *per_run.entry(event.execution_id.as_str()).or_default() += 1;
    }
    assert_eq!(per_run.len(), RUNS);

    for result in &results {
        assert_eq!(result.status, ExecutionStatus::Succeeded);
        assert_eq!(per_run.get(result.execution_id.as_str()), Some(&EVENTS_PER_RUN));
        let metrics = summarize_events(&result.execution_id, &events).expect("metrics");
        assert_eq!(metrics.retry_count, 1);
        assert_eq!(metrics.executed_stage_count, 2);
    }
    assert_eq!(tracker.tracked_executions(), 0);
}
