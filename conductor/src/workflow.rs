//! Analyze, select and run a task from a loaded configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::agents::StageAgentRegistry;
use crate::agents::command::CommandAgent;
use crate::core::analyzer::{TaskAnalysis, analyze};
use crate::core::plan::StagePlan;
use crate::core::selector::{SelectorConfig, select};
use crate::io::config::ConductorConfig;
use crate::io::metrics_log::MetricsLog;
use crate::io::run_log::{RunPaths, RunWriteRequest, write_run};
use crate::metrics::MetricsTracker;
use crate::pipeline::{PipelineExecutor, WorkflowResult};

/// Everything produced by one workflow run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    pub analysis: TaskAnalysis,
    pub plan: StagePlan,
    pub result: WorkflowResult,
}

/// Analyze a description and select its plan. Pure.
pub fn plan_for(description: &str, selector: &SelectorConfig) -> (TaskAnalysis, StagePlan) {
    let analysis = analyze(description);
    let plan = select(&analysis, selector);
    (analysis, plan)
}

/// Build command-backed agents for every `[agents.<stage>]` entry.
pub fn command_registry(config: &ConductorConfig, root: &Path) -> Result<StageAgentRegistry> {
    let runs_dir = config.runs_dir_path(root);
    let mut registry = StageAgentRegistry::new();
    for (stage, agent) in config.stage_agents()? {
        let agent = CommandAgent::from_config(agent, &runs_dir)
            .with_context(|| format!("configure {stage} agent"))?;
        registry.register(stage, Arc::new(agent));
    }
    Ok(registry)
}

/// Composes the analyzer, selector and executor for one project root.
pub struct Workflow {
    selector: SelectorConfig,
    runs_dir: PathBuf,
    executor: PipelineExecutor,
}

impl Workflow {
    /// Command agents from config, metrics appended to the configured log.
    pub async fn from_config(root: &Path, config: &ConductorConfig) -> Result<Self> {
        let registry = command_registry(config, root)?;
        let log = MetricsLog::open(&config.metrics_log_path(root)).await?;
        Self::with_registry(root, config, registry, Arc::new(MetricsTracker::with_log(log)))
    }

    pub fn with_registry(
        root: &Path,
        config: &ConductorConfig,
        registry: StageAgentRegistry,
        metrics: Arc<MetricsTracker>,
    ) -> Result<Self> {
        let executor = PipelineExecutor::new(registry, config.retry_limits(), metrics)
            .with_run_timeout(config.run_timeout());
        Ok(Self {
            selector: config.selector_config()?,
            runs_dir: config.runs_dir_path(root),
            executor,
        })
    }

    pub fn selector(&self) -> &SelectorConfig {
        &self.selector
    }

    pub fn metrics(&self) -> &Arc<MetricsTracker> {
        self.executor.metrics()
    }

    /// Analyze, select and run `description`, then persist the run files.
    ///
    /// The run itself never fails; errors come only from persisting results.
    #[instrument(skip_all)]
    pub async fn run(&self, description: &str, cancel: CancellationToken) -> Result<WorkflowReport> {
        let (analysis, plan) = plan_for(description, &self.selector);
        info!(
            intent = %analysis.primary_intent,
            complexity = %analysis.complexity,
            preset = %plan.preset,
            "plan selected"
        );
        let result = self.executor.run(description, &plan, cancel).await;

        if let Err(err) = self.executor.metrics().flush().await {
            warn!(err = %format!("{err:#}"), "metrics log incomplete");
        }
        write_run(&RunWriteRequest {
            runs_dir: &self.runs_dir,
            analysis: &analysis,
            plan: &plan,
            result: &result,
        })?;

        Ok(WorkflowReport {
            analysis,
            plan,
            result,
        })
    }

    pub fn run_paths(&self, execution_id: &str) -> RunPaths {
        RunPaths::new(&self.runs_dir, execution_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::selector::Preset;
    use crate::core::types::{ExecutionStatus, StageName};
    use crate::io::config::AgentConfig;
    use crate::io::run_log::load_result;
    use crate::test_support::ScriptedAgent;

    #[test]
    fn plan_for_composes_analysis_and_selection() {
        let (analysis, plan) = plan_for(
            "Fix the null pointer bug in payment processor",
            &SelectorConfig::default(),
        );
        assert_eq!(analysis.word_count, 8);
        assert_eq!(plan.preset, Preset::Minimal);
    }

    #[test]
    fn registry_has_one_agent_per_configured_stage() {
        let mut config = ConductorConfig::default();
        config.agents.insert(
            "test".to_string(),
            AgentConfig {
                command: vec!["tester".to_string()],
                ..AgentConfig::default()
            },
        );
        let registry = command_registry(&config, Path::new(".")).expect("registry");
        assert_eq!(registry.stages(), vec![StageName::Test]);
    }

    #[tokio::test]
    async fn run_persists_result_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = ConductorConfig::default();
        let registry = StageAgentRegistry::new()
            .with(StageName::Implement, ScriptedAgent::scores([95.0]))
            .with(StageName::Test, ScriptedAgent::scores([95.0]));
        let workflow = Workflow::with_registry(
            temp.path(),
            &config,
            registry,
            Arc::new(MetricsTracker::in_memory()),
        )
        .expect("workflow");

        let report = workflow
            .run("Fix the null pointer bug in payment processor", CancellationToken::new())
            .await
            .expect("run");
        assert_eq!(report.result.status, ExecutionStatus::Succeeded);

        let paths = workflow.run_paths(&report.result.execution_id);
        assert!(paths.plan_path.is_file());
        let loaded = load_result(&config.runs_dir_path(temp.path()), &report.result.execution_id)
            .expect("load result");
        assert_eq!(loaded, report.result);
    }
}
