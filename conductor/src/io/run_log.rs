//! Per-run files under `<runs_dir>/<execution_id>/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::core::analyzer::TaskAnalysis;
use crate::core::plan::StagePlan;
use crate::core::types::StageName;
use crate::pipeline::WorkflowResult;

#[derive(Debug, Clone)]
pub struct RunPaths {
    pub dir: PathBuf,
    pub result_path: PathBuf,
    pub plan_path: PathBuf,
    pub analysis_path: PathBuf,
}

impl RunPaths {
    pub fn new(runs_dir: &Path, execution_id: &str) -> Self {
        let dir = runs_dir.join(execution_id);
        Self {
            result_path: dir.join("result.json"),
            plan_path: dir.join("plan.json"),
            analysis_path: dir.join("analysis.json"),
            dir,
        }
    }

    /// Captured output of one agent attempt.
    pub fn agent_log_path(&self, stage: StageName, attempt: u32) -> PathBuf {
        self.dir.join(format!("{stage}-{attempt}.log"))
    }
}

pub struct RunWriteRequest<'a> {
    pub runs_dir: &'a Path,
    pub analysis: &'a TaskAnalysis,
    pub plan: &'a StagePlan,
    pub result: &'a WorkflowResult,
}

pub fn write_run(request: &RunWriteRequest<'_>) -> Result<RunPaths> {
    let paths = RunPaths::new(request.runs_dir, &request.result.execution_id);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create run dir {}", paths.dir.display()))?;

    write_json(&paths.analysis_path, request.analysis)?;
    write_json(&paths.plan_path, request.plan)?;
    write_json(&paths.result_path, request.result)?;

    Ok(paths)
}

pub fn load_result(runs_dir: &Path, execution_id: &str) -> Result<WorkflowResult> {
    read_json(&RunPaths::new(runs_dir, execution_id).result_path)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize {}", path.display()))?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::analyzer::analyze;
    use crate::core::selector::{SelectorConfig, select};
    use crate::core::types::ExecutionStatus;

    #[test]
    fn run_files_are_written_and_result_loads_back() {
        let temp = tempfile::tempdir().expect("tempdir");
        let analysis = analyze("Fix the null pointer bug in payment processor");
        let plan = select(&analysis, &SelectorConfig::default());
        let result = WorkflowResult::empty("exec-20260101_000000-abc123", ExecutionStatus::Failed);

        let paths = write_run(&RunWriteRequest {
            runs_dir: temp.path(),
            analysis: &analysis,
            plan: &plan,
            result: &result,
        })
        .expect("write");

        assert!(paths.plan_path.is_file());
        assert!(paths.analysis_path.is_file());
        let raw = fs::read_to_string(&paths.result_path).expect("read");
        assert!(raw.ends_with('\n'));

        let loaded = load_result(temp.path(), &result.execution_id).expect("load");
        assert_eq!(loaded, result);
    }

    #[test]
    fn agent_log_path_names_stage_and_attempt() {
        let paths = RunPaths::new(Path::new("/runs"), "exec-1");
        assert_eq!(
            paths.agent_log_path(StageName::Implement, 2),
            PathBuf::from("/runs/exec-1/implement-2.log")
        );
    }
}
