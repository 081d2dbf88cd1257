use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::judge::Judgment;
use crate::results::load_case_result;

#[derive(Debug, Default, PartialEq)]
pub struct ReportSummary {
    pub cases: usize,
    pub passed: usize,
    /// Expectation kind -> (passed, total).
    pub check_pass_rates: BTreeMap<String, (usize, usize)>,
    pub failed_cases: Vec<String>,
}

pub fn load_result_files(run_dir: &Path) -> Result<Vec<PathBuf>> {
    if !run_dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(run_dir).with_context(|| format!("read {}", run_dir.display()))? {
        let entry = entry.context("read entry")?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub fn aggregate(run_dir: &Path) -> Result<(ReportSummary, Vec<String>)> {
    let mut summary = ReportSummary::default();
    let mut warnings = Vec::new();

    for path in load_result_files(run_dir)? {
        let result = match load_case_result(&path) {
            Ok(result) => result,
            Err(err) => {
                warnings.push(format!("skip {}: {err:#}", path.display()));
                continue;
            }
        };
        summary.cases += 1;
        if result.passed {
            summary.passed += 1;
        } else {
            summary.failed_cases.push(result.case_id.clone());
        }
        update_check_pass_rates(&mut summary.check_pass_rates, &result.judgment);
    }

    Ok((summary, warnings))
}

fn update_check_pass_rates(stats: &mut BTreeMap<String, (usize, usize)>, judgment: &Judgment) {
    for check in &judgment.checks {
        let entry = stats.entry(check.label().to_string()).or_insert((0, 0));
        if check.passed() {
            entry.0 += 1;
        }
        entry.1 += 1;
    }
}
