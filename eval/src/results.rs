//! Result persistence.
//!
//! Each judged case is written to `eval/results/<eval_run_id>/<case_id>.json`
//! together with the analysis and plan that were judged.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use conductor::core::analyzer::TaskAnalysis;
use conductor::core::plan::StagePlan;

use crate::judge::Judgment;

/// Everything recorded for one case in one eval run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub case_id: String,
    pub eval_run_id: String,
    /// SHA-256 hash of the case file for reproducibility tracking.
    pub case_hash: String,
    pub recorded_at: DateTime<Utc>,
    pub passed: bool,
    pub judgment: Judgment,
    pub analysis: TaskAnalysis,
    pub plan: StagePlan,
}

pub fn run_results_dir(base_dir: &Path, eval_run_id: &str) -> PathBuf {
    base_dir.join(eval_run_id)
}

/// `eval-<UTC yyyymmdd_HHMMSS>`.
pub fn new_eval_run_id(now: DateTime<Utc>) -> String {
    format!("eval-{}", now.format("%Y%m%d_%H%M%S"))
}

#[instrument(skip_all, fields(case_id = %result.case_id, eval_run_id = %result.eval_run_id))]
pub fn write_case_result(base_dir: &Path, result: &CaseResult) -> Result<PathBuf> {
    let dir = run_results_dir(base_dir, &result.eval_run_id);
    fs::create_dir_all(&dir).with_context(|| format!("create results dir {}", dir.display()))?;
    let path = dir.join(format!("{}.json", result.case_id));
    let contents = serde_json::to_string_pretty(result).context("serialize case result")?;
    fs::write(&path, format!("{contents}\n"))
        .with_context(|| format!("write {}", path.display()))?;
    debug!(path = %path.display(), "case result written");
    Ok(path)
}

pub fn load_case_result(path: &Path) -> Result<CaseResult> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

pub fn file_sha256(path: &Path) -> Result<String> {
    let contents = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(contents);
    let digest = hasher.finalize();
    Ok(hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use conductor::core::analyzer::analyze;
    use conductor::core::selector::{SelectorConfig, select};
    use tempfile::tempdir;

    #[test]
    fn eval_run_id_uses_utc_timestamp() {
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).single().expect("time");
        assert_eq!(new_eval_run_id(now), "eval-20260304_050607");
    }

    #[test]
    fn case_result_is_written_and_reloaded() {
        let temp = tempdir().expect("tempdir");
        let analysis = analyze("Add a cache");
        let plan = select(&analysis, &SelectorConfig::default());
        let result = CaseResult {
            case_id: "cache".to_string(),
            eval_run_id: "eval-1".to_string(),
            case_hash: "abc".to_string(),
            recorded_at: Utc::now(),
            passed: true,
            judgment: Judgment { checks: Vec::new() },
            analysis,
            plan,
        };

        let path = write_case_result(temp.path(), &result).expect("write");
        assert_eq!(path, temp.path().join("eval-1").join("cache.json"));
        assert_eq!(load_case_result(&path).expect("load"), result);
    }

    #[test]
    fn hashes_file_contents() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("case.toml");
        fs::write(&path, "abc").expect("write");
        assert_eq!(
            file_sha256(&path).expect("hash"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
