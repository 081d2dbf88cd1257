//! Stage agent backed by an external command.
//!
//! The command receives the [`StageContext`] as JSON on stdin and must print a
//! single JSON outcome on stdout:
//!
//! ```json
//! { "artifact": "path/or/id", "quality_score": 82.5 }
//! ```
//!
//! Non-zero exit, timeout, invalid JSON or a schema violation is an
//! infrastructure failure.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use jsonschema::Validator;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use super::{StageAgent, StageContext, StageOutput};
use crate::io::config::AgentConfig;
use crate::io::process::{CommandOutput, run_command_with_timeout};
use crate::io::run_log::RunPaths;

const OUTCOME_SCHEMA: &str = include_str!("schemas/stage_outcome.schema.json");

static OUTCOME_VALIDATOR: LazyLock<Result<Validator, String>> = LazyLock::new(|| {
    let schema: Value = serde_json::from_str(OUTCOME_SCHEMA).map_err(|err| err.to_string())?;
    jsonschema::validator_for(&schema).map_err(|err| err.to_string())
});

/// Runs one configured command per stage attempt.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
    runs_dir: PathBuf,
}

impl CommandAgent {
    pub fn from_config(config: &AgentConfig, runs_dir: &Path) -> Result<Self> {
        let (program, args) = config
            .command
            .split_first()
            .ok_or_else(|| anyhow!("agent command must not be empty"))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout: config.timeout(),
            output_limit_bytes: config.output_limit_bytes,
            runs_dir: runs_dir.to_path_buf(),
        })
    }

    /// The soft timeout wins when it is shorter than the configured one.
    fn effective_timeout(&self, soft_timeout: Option<Duration>) -> Duration {
        soft_timeout.map_or(self.timeout, |soft| soft.min(self.timeout))
    }
}

#[async_trait]
impl StageAgent for CommandAgent {
    #[instrument(skip_all, fields(stage = %context.stage, attempt = context.attempt, program = %self.program))]
    async fn invoke(&self, context: &StageContext) -> Result<StageOutput> {
        let timeout = self.effective_timeout(context.soft_timeout);
        info!(timeout_secs = timeout.as_secs(), "starting stage agent");

        let input = serde_json::to_vec(context).context("serialize stage context")?;
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env("CONDUCTOR_EXECUTION_ID", &context.execution_id)
            .env("CONDUCTOR_STAGE", context.stage.as_str())
            .env("CONDUCTOR_ATTEMPT", context.attempt.to_string());

        let output = run_command_with_timeout(cmd, Some(input), timeout, self.output_limit_bytes)
            .await
            .with_context(|| format!("run {} agent '{}'", context.stage, self.program))?;

        let log_path = RunPaths::new(&self.runs_dir, &context.execution_id)
            .agent_log_path(context.stage, context.attempt);
        if let Err(err) = write_agent_log(&log_path, &output).await {
            warn!(path = %log_path.display(), err = %err, "failed to write agent log");
        }

        if output.timed_out {
            warn!(timeout_secs = timeout.as_secs(), "stage agent timed out");
            bail!("{} agent timed out after {:?}", context.stage, timeout);
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "stage agent failed");
            bail!(
                "{} agent failed with status {:?}",
                context.stage,
                output.status.code()
            );
        }
        if output.stdout.is_truncated() {
            bail!(
                "{} agent output exceeded {} bytes",
                context.stage,
                self.output_limit_bytes
            );
        }

        let outcome = parse_outcome(&output.stdout.bytes)
            .with_context(|| format!("{} agent output", context.stage))?;
        debug!(quality_score = ?outcome.quality_score, "parsed stage outcome");
        Ok(outcome)
    }
}

/// Parse and schema-check an agent's stdout.
pub fn parse_outcome(stdout: &[u8]) -> Result<StageOutput> {
    let value: Value = serde_json::from_slice(stdout).context("parse outcome json")?;
    let validator = OUTCOME_VALIDATOR
        .as_ref()
        .map_err(|err| anyhow!("invalid outcome schema: {err}"))?;
    let messages: Vec<String> = validator
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("outcome schema validation failed:\n- {}", messages.join("\n- "));
    }
    serde_json::from_value(value).context("deserialize outcome")
}

async fn write_agent_log(path: &Path, output: &CommandOutput) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create agent log dir {}", parent.display()))?;
    }
    let mut buf = String::new();
    output.stdout.write_section("stdout", &mut buf);
    output.stderr.write_section("stderr", &mut buf);
    if output.timed_out {
        buf.push_str("[agent timed out]\n");
    }

    tokio::fs::write(path, buf)
        .await
        .with_context(|| format!("write agent log {}", path.display()))
}
