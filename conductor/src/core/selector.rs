//! Deterministic stage-plan selection.
//!
//! [`select`] maps a [`TaskAnalysis`] to a [`StagePlan`] in four steps: route
//! the intent to a preset, apply the risk tie-break, escalate at most once,
//! then mark stages skipped. The plan always lists every stage.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::analyzer::{ENUMERATION_BUMP, TaskAnalysis};
use crate::core::plan::{StagePlan, StageSpec};
use crate::core::types::{Complexity, Intent, StageMode, StageName};

pub const DEFAULT_THRESHOLD: f64 = 75.0;
pub const DEFAULT_MINIMAL_LOC_CEILING: u32 = 40;
pub const DEFAULT_LARGE_CHANGE_LOC: u32 = 400;

/// Named default stage lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Minimal,
    Standard,
    Comprehensive,
    FullSdlc,
    /// Comparison-only plan that stops after design.
    Validation,
}

impl Preset {
    pub const ALL: [Preset; 5] = [
        Preset::Minimal,
        Preset::Standard,
        Preset::Comprehensive,
        Preset::FullSdlc,
        Preset::Validation,
    ];

    /// One tier up. `FullSdlc` saturates; `Validation` is never escalated.
    pub fn escalated(self) -> Self {
        match self {
            Preset::Minimal => Preset::Standard,
            Preset::Standard => Preset::Comprehensive,
            Preset::Comprehensive | Preset::FullSdlc => Preset::FullSdlc,
            Preset::Validation => Preset::Validation,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Preset::Minimal => "minimal",
            Preset::Standard => "standard",
            Preset::Comprehensive => "comprehensive",
            Preset::FullSdlc => "full_sdlc",
            Preset::Validation => "validation",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage lists for each preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresetStages {
    pub minimal: Vec<StageName>,
    pub standard: Vec<StageName>,
    pub comprehensive: Vec<StageName>,
    pub full_sdlc: Vec<StageName>,
    pub validation: Vec<StageName>,
}

impl PresetStages {
    pub fn stages(&self, preset: Preset) -> &[StageName] {
        match preset {
            Preset::Minimal => &self.minimal,
            Preset::Standard => &self.standard,
            Preset::Comprehensive => &self.comprehensive,
            Preset::FullSdlc => &self.full_sdlc,
            Preset::Validation => &self.validation,
        }
    }
}

impl Default for PresetStages {
    fn default() -> Self {
        use StageName::{Analyze, Architect, Design, Enhance, Implement, Plan, Review, Test};
        Self {
            minimal: vec![Implement, Test],
            standard: vec![Plan, Implement, Review, Test],
            comprehensive: vec![Enhance, Plan, Architect, Design, Implement, Review, Test],
            full_sdlc: StageName::ORDER.to_vec(),
            validation: vec![Enhance, Analyze, Architect, Design],
        }
    }
}

/// Change-size thresholds used by the risk rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// A Minimal plan estimated above this many lines becomes Standard.
    pub minimal_loc_ceiling: u32,
    /// Estimates at or above this many lines escalate the preset.
    pub large_change_loc: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            minimal_loc_ceiling: DEFAULT_MINIMAL_LOC_CEILING,
            large_change_loc: DEFAULT_LARGE_CHANGE_LOC,
        }
    }
}

/// Immutable inputs to [`select`] besides the analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorConfig {
    pub presets: PresetStages,
    pub thresholds: BTreeMap<StageName, f64>,
    pub risk: RiskConfig,
    /// Stages whose infrastructure failure is recorded but not fatal.
    pub best_effort: BTreeSet<StageName>,
}

impl SelectorConfig {
    pub fn threshold(&self, stage: StageName) -> f64 {
        self.thresholds
            .get(&stage)
            .copied()
            .unwrap_or(DEFAULT_THRESHOLD)
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            presets: PresetStages::default(),
            thresholds: StageName::GATED
                .into_iter()
                .map(|stage| (stage, DEFAULT_THRESHOLD))
                .collect(),
            risk: RiskConfig::default(),
            best_effort: BTreeSet::new(),
        }
    }
}

/// One row of the intent routing table.
#[derive(Debug, Clone, Copy)]
pub struct IntentRoute {
    pub intent: Intent,
    /// Route applies when complexity is at most this tier; `None` matches any.
    pub up_to: Option<Complexity>,
    pub preset: Preset,
}

const fn route(intent: Intent, up_to: Option<Complexity>, preset: Preset) -> IntentRoute {
    IntentRoute {
        intent,
        up_to,
        preset,
    }
}

/// Default preset per intent; the first matching row wins.
pub const INTENT_ROUTES: &[IntentRoute] = &[
    route(Intent::Validate, None, Preset::Validation),
    route(Intent::Fix, Some(Complexity::Minimal), Preset::Minimal),
    route(Intent::Fix, Some(Complexity::Detailed), Preset::Standard),
    route(Intent::Test, Some(Complexity::Minimal), Preset::Minimal),
    route(Intent::Test, Some(Complexity::Detailed), Preset::Standard),
    route(Intent::Review, Some(Complexity::Detailed), Preset::Standard),
    route(Intent::Refactor, Some(Complexity::Standard), Preset::Standard),
    route(Intent::Optimize, Some(Complexity::Standard), Preset::Standard),
    route(Intent::Build, Some(Complexity::Standard), Preset::Standard),
    route(Intent::Build, Some(Complexity::Detailed), Preset::Comprehensive),
    route(Intent::Explore, Some(Complexity::Standard), Preset::Standard),
];

/// Preset when no route matches.
pub const FALLBACK_PRESET: Preset = Preset::Comprehensive;

fn routed_preset(intent: Intent, complexity: Complexity) -> Option<Preset> {
    INTENT_ROUTES
        .iter()
        .find(|row| row.intent == intent && row.up_to.is_none_or(|max| complexity <= max))
        .map(|row| row.preset)
}

/// Build the stage plan for an analyzed task. Pure and deterministic.
pub fn select(analysis: &TaskAnalysis, config: &SelectorConfig) -> StagePlan {
    let mut rationale = Vec::new();

    let mut preset = match routed_preset(analysis.primary_intent, analysis.complexity) {
        Some(preset) => {
            rationale.push(format!(
                "{} intent at {} complexity routes to the {} preset",
                analysis.primary_intent, analysis.complexity, preset
            ));
            preset
        }
        None => {
            rationale.push(format!(
                "no route for {} intent at {} complexity; using the {} preset",
                analysis.primary_intent, analysis.complexity, FALLBACK_PRESET
            ));
            FALLBACK_PRESET
        }
    };

    if preset == Preset::Minimal && analysis.estimated_loc > config.risk.minimal_loc_ceiling {
        rationale.push(format!(
            "estimated {} lines exceeds the minimal ceiling of {}; using the standard preset",
            analysis.estimated_loc, config.risk.minimal_loc_ceiling
        ));
        preset = Preset::Standard;
    }

    if preset != Preset::Validation {
        if let Some(reason) = escalation_reason(analysis, config) {
            let escalated = preset.escalated();
            rationale.push(format!("escalated {preset} to {escalated}: {reason}"));
            preset = escalated;
        }
    }

    let members = config.presets.stages(preset);
    let stages = StageName::ORDER
        .into_iter()
        .map(|name| {
            let gated = name.is_gated();
            StageSpec {
                name,
                mode: stage_mode(name, analysis.complexity),
                gated,
                skip_reason: skip_reason(name, preset, members, analysis),
                threshold: gated.then(|| config.threshold(name)),
                best_effort: config.best_effort.contains(&name),
            }
        })
        .collect();

    StagePlan {
        preset,
        stages,
        rationale,
    }
}

fn escalation_reason(analysis: &TaskAnalysis, config: &SelectorConfig) -> Option<String> {
    if analysis.complexity == Complexity::Comprehensive {
        return Some("comprehensive complexity".to_string());
    }
    if analysis.references_existing_code() && analysis.primary_intent != Intent::Validate {
        return Some(format!(
            "references existing code without validation intent ({} refs)",
            analysis.existing_code_refs.len()
        ));
    }
    if analysis.estimated_loc >= config.risk.large_change_loc {
        return Some(format!(
            "estimated {} lines is a large change",
            analysis.estimated_loc
        ));
    }
    None
}

fn skip_reason(
    name: StageName,
    preset: Preset,
    members: &[StageName],
    analysis: &TaskAnalysis,
) -> Option<String> {
    if !members.contains(&name) {
        return Some(format!("not part of the {preset} preset"));
    }
    let signals = &analysis.signals;
    match name {
        StageName::Enhance
            if analysis.complexity >= Complexity::Detailed
                && signals.enumerated_items >= ENUMERATION_BUMP =>
        {
            Some("description already enumerates requirements".to_string())
        }
        StageName::Architect if signals.architecture_specified => {
            Some("description already contains architecture decisions".to_string())
        }
        StageName::Design if signals.external_api_specified => {
            Some("integrates a fully specified external API".to_string())
        }
        _ => None,
    }
}

fn stage_mode(name: StageName, complexity: Complexity) -> StageMode {
    match complexity {
        Complexity::Minimal => StageMode::Quick,
        Complexity::Standard if matches!(name, StageName::Enhance | StageName::Document) => {
            StageMode::Quick
        }
        _ => StageMode::Full,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::analyzer::analyze;
    use crate::core::code_refs::CodeRef;
    use crate::core::plan::validate_plan;

    fn analysis(intent: Intent, complexity: Complexity) -> TaskAnalysis {
        TaskAnalysis {
            primary_intent: intent,
            complexity,
            ..TaskAnalysis::degenerate()
        }
    }

    #[test]
    fn bug_fix_scenario_selects_minimal_preset() {
        let plan = select(
            &analyze("Fix the null pointer bug in payment processor"),
            &SelectorConfig::default(),
        );
        assert_eq!(plan.preset, Preset::Minimal);
        assert_eq!(plan.active_names(), vec![StageName::Implement, StageName::Test]);
        assert!(plan.active_stages().all(|spec| spec.mode == StageMode::Quick));
    }

    #[test]
    fn validation_scenario_stops_after_design() {
        let plan = select(
            &analyze(
                "see existing implementation at lines 751-878 in project_cleanup_agent.py, compare with new approach",
            ),
            &SelectorConfig::default(),
        );
        assert_eq!(plan.preset, Preset::Validation);
        let active = plan.active_names();
        assert_eq!(active.last(), Some(&StageName::Design));
        assert!(!active.contains(&StageName::Implement));
    }

    #[test]
    fn every_plan_is_complete_and_valid() {
        let config = SelectorConfig::default();
        for intent in Intent::PRIORITY {
            for complexity in Complexity::ALL {
                let plan = select(&analysis(intent, complexity), &config);
                assert_eq!(plan.stages.len(), StageName::ORDER.len());
                assert!(validate_plan(&plan).is_empty(), "{intent}/{complexity}");
                for spec in &plan.stages {
                    assert_eq!(spec.gated, spec.name.is_gated());
                    assert_eq!(spec.threshold.is_some(), spec.gated);
                }
            }
        }
    }

    #[test]
    fn selection_is_deterministic() {
        let config = SelectorConfig::default();
        let task = analyze("Build a CSV export feature with streaming; it must handle large files");
        assert_eq!(select(&task, &config), select(&task, &config));
    }

    #[test]
    fn unrouted_intent_falls_back_to_comprehensive() {
        let plan = select(
            &analysis(Intent::Explore, Complexity::Detailed),
            &SelectorConfig::default(),
        );
        assert_eq!(plan.preset, Preset::Comprehensive);
    }

    #[test]
    fn code_refs_escalate_one_tier() {
        let mut task = analysis(Intent::Fix, Complexity::Minimal);
        task.existing_code_refs.push(CodeRef {
            path: "src/payment.rs".to_string(),
            lines: None,
        });
        let plan = select(&task, &SelectorConfig::default());
        assert_eq!(plan.preset, Preset::Standard);
        assert!(plan.rationale.iter().any(|line| line.contains("existing code")));
    }

    #[test]
    fn keywordless_description_with_path_still_escalates() {
        let plan = select(
            &analyze("Update src/payment/processor.rs lines 10-20 to use the retry helper"),
            &SelectorConfig::default(),
        );
        assert_eq!(plan.preset, Preset::Comprehensive);
        assert!(plan.rationale.iter().any(|line| line.contains("existing code")));
    }

    #[test]
    fn large_minimal_estimate_uses_standard() {
        let mut task = analysis(Intent::Fix, Complexity::Minimal);
        task.estimated_loc = 41;
        assert_eq!(select(&task, &SelectorConfig::default()).preset, Preset::Standard);
    }

    #[test]
    fn escalation_applies_at_most_once() {
        let mut task = analysis(Intent::Fix, Complexity::Minimal);
        task.estimated_loc = 500;
        task.existing_code_refs.push(CodeRef {
            path: "a.rs".to_string(),
            lines: None,
        });
        // Risk rule lifts minimal to standard, then one escalation.
        assert_eq!(
            select(&task, &SelectorConfig::default()).preset,
            Preset::Comprehensive
        );

        let task = analysis(Intent::Build, Complexity::Comprehensive);
        assert_eq!(select(&task, &SelectorConfig::default()).preset, Preset::FullSdlc);
    }

    #[test]
    fn validation_is_never_escalated() {
        let mut task = analysis(Intent::Validate, Complexity::Comprehensive);
        task.estimated_loc = 10_000;
        task.existing_code_refs.push(CodeRef {
            path: "a.rs".to_string(),
            lines: None,
        });
        assert_eq!(select(&task, &SelectorConfig::default()).preset, Preset::Validation);
    }

    #[test]
    fn skip_rules_mark_subsumed_stages() {
        let mut task = analysis(Intent::Build, Complexity::Detailed);
        task.signals.enumerated_items = 4;
        task.signals.architecture_specified = true;
        task.signals.external_api_specified = true;
        let plan = select(&task, &SelectorConfig::default());
        assert_eq!(plan.preset, Preset::Comprehensive);
        for stage in [StageName::Enhance, StageName::Architect, StageName::Design] {
            let spec = plan.spec(stage).expect("stage present");
            assert!(spec.is_skipped(), "{stage} should be skipped");
            assert!(!spec
                .skip_reason
                .as_deref()
                .unwrap_or_default()
                .starts_with("not part of"));
        }
        assert_eq!(
            plan.spec(StageName::Document).and_then(|spec| spec.skip_reason.clone()),
            Some("not part of the comprehensive preset".to_string())
        );
    }

    #[test]
    fn modes_follow_complexity() {
        let config = SelectorConfig::default();
        let plan = select(&analysis(Intent::Build, Complexity::Standard), &config);
        assert_eq!(plan.spec(StageName::Enhance).map(|s| s.mode), Some(StageMode::Quick));
        assert_eq!(plan.spec(StageName::Implement).map(|s| s.mode), Some(StageMode::Full));

        let plan = select(&analysis(Intent::Build, Complexity::Detailed), &config);
        assert!(plan.stages.iter().all(|spec| spec.mode == StageMode::Full));
    }

    #[test]
    fn configured_thresholds_and_best_effort_flow_into_specs() {
        let mut config = SelectorConfig::default();
        config.thresholds.insert(StageName::Review, 90.0);
        config.best_effort.insert(StageName::Test);
        let plan = select(&analysis(Intent::Fix, Complexity::Standard), &config);
        assert_eq!(plan.spec(StageName::Review).and_then(|s| s.threshold), Some(90.0));
        assert_eq!(plan.spec(StageName::Implement).and_then(|s| s.threshold), Some(75.0));
        assert!(plan.spec(StageName::Test).is_some_and(|s| s.best_effort));
    }
}
