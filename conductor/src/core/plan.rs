//! Stage plan types and their structural invariants.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::selector::Preset;
use crate::core::types::{StageMode, StageName};

/// Configuration of one stage within a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    pub name: StageName,
    pub mode: StageMode,
    pub gated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub best_effort: bool,
}

impl StageSpec {
    pub fn is_skipped(&self) -> bool {
        self.skip_reason.is_some()
    }
}

/// Ordered stage configuration produced by the selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagePlan {
    pub preset: Preset,
    pub stages: Vec<StageSpec>,
    #[serde(default)]
    pub rationale: Vec<String>,
}

impl StagePlan {
    /// Stages that will be executed, in order.
    pub fn active_stages(&self) -> impl Iterator<Item = &StageSpec> {
        self.stages.iter().filter(|spec| !spec.is_skipped())
    }

    pub fn active_names(&self) -> Vec<StageName> {
        self.active_stages().map(|spec| spec.name).collect()
    }

    pub fn skipped_names(&self) -> Vec<StageName> {
        self.stages
            .iter()
            .filter(|spec| spec.is_skipped())
            .map(|spec| spec.name)
            .collect()
    }

    pub fn spec(&self, name: StageName) -> Option<&StageSpec> {
        self.stages.iter().find(|spec| spec.name == name)
    }
}

/// Check plan invariants:
/// - every stage present exactly once
/// - stages in dependency order
/// - gated stages carry a threshold within `[0, 100]`
/// - skipped stages have a non-empty reason
pub fn validate_plan(plan: &StagePlan) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for spec in &plan.stages {
        if !seen.insert(spec.name) {
            errors.push(format!("duplicate stage '{}'", spec.name));
        }
        if spec.gated {
            match spec.threshold {
                None => errors.push(format!("{}: gated stage has no threshold", spec.name)),
                Some(threshold) if !(0.0..=100.0).contains(&threshold) => errors.push(format!(
                    "{}: threshold {} outside [0, 100]",
                    spec.name, threshold
                )),
                Some(_) => {}
            }
        }
        if spec
            .skip_reason
            .as_deref()
            .is_some_and(|reason| reason.trim().is_empty())
        {
            errors.push(format!("{}: skip reason must not be empty", spec.name));
        }
    }

    for stage in StageName::ORDER {
        if !seen.contains(&stage) {
            errors.push(format!("missing stage '{stage}'"));
        }
    }

    if !plan.stages.windows(2).all(|pair| pair[0].name < pair[1].name) {
        errors.push("stages must follow dependency order".to_string());
    }

    errors
}
