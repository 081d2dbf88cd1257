//! Judge analyzer and selector output against case expectations.

use serde::{Deserialize, Serialize};
use tracing::debug;

use conductor::core::analyzer::TaskAnalysis;
use conductor::core::code_refs::CodeRef;
use conductor::core::plan::StagePlan;
use conductor::core::selector::Preset;
use conductor::core::types::{Complexity, Intent, StageName};

use crate::case::Expectations;

/// Collected check outcomes for one case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    pub checks: Vec<CheckOutcome>,
}

impl Judgment {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(CheckOutcome::passed)
    }
}

/// Result of judging a single expectation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckOutcome {
    Intent {
        expected: Intent,
        actual: Intent,
        passed: bool,
    },
    Complexity {
        expected: Complexity,
        actual: Complexity,
        passed: bool,
    },
    Preset {
        expected: Preset,
        actual: Preset,
        passed: bool,
    },
    ActiveStages {
        expected: Vec<StageName>,
        actual: Vec<StageName>,
        passed: bool,
    },
    CodeRefs {
        expected: Vec<CodeRef>,
        actual: Vec<CodeRef>,
        passed: bool,
    },
}

impl CheckOutcome {
    pub fn passed(&self) -> bool {
        match self {
            CheckOutcome::Intent { passed, .. }
            | CheckOutcome::Complexity { passed, .. }
            | CheckOutcome::Preset { passed, .. }
            | CheckOutcome::ActiveStages { passed, .. }
            | CheckOutcome::CodeRefs { passed, .. } => *passed,
        }
    }

    /// Expectation kind, used to aggregate pass rates.
    pub fn label(&self) -> &'static str {
        match self {
            CheckOutcome::Intent { .. } => "intent",
            CheckOutcome::Complexity { .. } => "complexity",
            CheckOutcome::Preset { .. } => "preset",
            CheckOutcome::ActiveStages { .. } => "active_stages",
            CheckOutcome::CodeRefs { .. } => "code_refs",
        }
    }
}

/// Judge every set expectation, in a fixed order.
pub fn judge(expect: &Expectations, analysis: &TaskAnalysis, plan: &StagePlan) -> Judgment {
    let mut checks = Vec::new();
    if let Some(expected) = expect.intent {
        let actual = analysis.primary_intent;
        checks.push(CheckOutcome::Intent {
            expected,
            actual,
            passed: expected == actual,
        });
    }
    if let Some(expected) = expect.complexity {
        let actual = analysis.complexity;
        checks.push(CheckOutcome::Complexity {
            expected,
            actual,
            passed: expected == actual,
        });
    }
    if let Some(expected) = expect.preset {
        let actual = plan.preset;
        checks.push(CheckOutcome::Preset {
            expected,
            actual,
            passed: expected == actual,
        });
    }
    if let Some(expected) = &expect.active_stages {
        let actual = plan.active_names();
        checks.push(CheckOutcome::ActiveStages {
            passed: *expected == actual,
            expected: expected.clone(),
            actual,
        });
    }
    if let Some(expected) = &expect.code_refs {
        let actual = analysis.existing_code_refs.clone();
        checks.push(CheckOutcome::CodeRefs {
            passed: *expected == actual,
            expected: expected.clone(),
            actual,
        });
    }
    for check in &checks {
        debug!(check = check.label(), passed = check.passed(), "check result");
    }
    Judgment { checks }
}
