//! CLI command implementations.

use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{info, instrument};

use conductor::core::selector::SelectorConfig;
use conductor::workflow::plan_for;

use crate::case::{LoadedCase, case_path, discover_cases};
use crate::judge::judge;
use crate::report::aggregate;
use crate::results::{CaseResult, file_sha256, new_eval_run_id, run_results_dir, write_case_result};

/// List all available cases.
pub fn list_cases(repo_root: &Path) -> Result<()> {
    let cases_dir = repo_root.join("eval").join("cases");
    for case in discover_cases(&cases_dir)? {
        println!("{}", case.id());
    }
    Ok(())
}

/// Judge one case, or every case when `case_id` is `None`, under default config.
#[instrument(skip_all, fields(case_id = ?case_id))]
pub fn run_cases(repo_root: &Path, case_id: Option<&str>) -> Result<()> {
    let cases_dir = repo_root.join("eval").join("cases");
    let results_base = repo_root.join("eval").join("results");
    let cases = match case_id {
        Some(id) => {
            let path = case_path(&cases_dir, id)?;
            if !path.exists() {
                bail!("case {} not found at {}", id, path.display());
            }
            vec![LoadedCase::load(&path).context("load case")?]
        }
        None => discover_cases(&cases_dir)?,
    };
    if cases.is_empty() {
        bail!("no cases found in {}", cases_dir.display());
    }

    let selector = SelectorConfig::default();
    let eval_run_id = new_eval_run_id(Utc::now());
    let mut passed = 0;
    for case in &cases {
        let result = evaluate_case(case, &selector, &eval_run_id)?;
        write_case_result(&results_base, &result)?;
        if result.passed {
            passed += 1;
        }
        println!(
            "run: case={} passed={} intent={} complexity={} preset={}",
            result.case_id,
            result.passed,
            result.analysis.primary_intent,
            result.analysis.complexity,
            result.plan.preset
        );
    }
    info!(eval_run_id, cases = cases.len(), passed, "eval run complete");
    println!(
        "run: eval_run_id={} passed={}/{} results={}",
        eval_run_id,
        passed,
        cases.len(),
        run_results_dir(&results_base, &eval_run_id).display()
    );
    Ok(())
}

/// Analyze, plan and judge one case. The hash covers the file the case was read from.
pub fn evaluate_case(
    case: &LoadedCase,
    selector: &SelectorConfig,
    eval_run_id: &str,
) -> Result<CaseResult> {
    let (analysis, plan) = plan_for(&case.file.case.description, selector);
    let judgment = judge(&case.file.expect, &analysis, &plan);
    Ok(CaseResult {
        case_id: case.id().to_string(),
        eval_run_id: eval_run_id.to_string(),
        case_hash: file_sha256(&case.path)?,
        recorded_at: Utc::now(),
        passed: judgment.passed(),
        judgment,
        analysis,
        plan,
    })
}

/// Show aggregated pass rates for an eval run.
pub fn report_run(repo_root: &Path, eval_run_id: &str) -> Result<()> {
    let run_dir = run_results_dir(&repo_root.join("eval").join("results"), eval_run_id);
    let (summary, warnings) = aggregate(&run_dir)?;
    if summary.cases == 0 {
        bail!("no results for {} in {}", eval_run_id, run_dir.display());
    }
    println!(
        "report: eval_run_id={} cases={} passed={}",
        eval_run_id, summary.cases, summary.passed
    );
    for (label, (passed, total)) in &summary.check_pass_rates {
        println!("report: check {} {}/{}", label, passed, total);
    }
    for case_id in &summary.failed_cases {
        println!("report: failed {}", case_id);
    }
    for warning in warnings {
        eprintln!("warning: {}", warning);
    }
    Ok(())
}
