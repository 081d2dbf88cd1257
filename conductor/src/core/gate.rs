//! Quality gate decisions for gated stages.

use serde::{Deserialize, Serialize};

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 100.0;
pub const DEFAULT_MAX_RETRIES_PER_STAGE: u32 = 2;

/// Retry bound applied to every gated stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryLimits {
    /// A gated stage runs at most `max_retries_per_stage + 1` times.
    pub max_retries_per_stage: u32,
}

impl Default for RetryLimits {
    fn default() -> Self {
        Self {
            max_retries_per_stage: DEFAULT_MAX_RETRIES_PER_STAGE,
        }
    }
}

/// What the executor does after a gated stage attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateAction {
    Advance,
    RetryStage,
    Escalate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityGateDecision {
    pub pass: bool,
    pub score: f64,
    pub threshold: f64,
    pub action: GateAction,
}

/// Decide the gate action for `attempt` (1-based).
///
/// A passing score always advances. A failing score retries while
/// `attempt <= max_retries`, so a stage runs at most `max_retries + 1` times.
pub fn decide(score: f64, threshold: f64, attempt: u32, max_retries: u32) -> QualityGateDecision {
    let pass = score >= threshold;
    let action = if pass {
        GateAction::Advance
    } else if attempt <= max_retries {
        GateAction::RetryStage
    } else {
        GateAction::Escalate
    };
    QualityGateDecision {
        pass,
        score,
        threshold,
        action,
    }
}

/// Normalize an agent-reported score. Missing or NaN scores count as zero.
pub fn clamp_score(score: Option<f64>) -> f64 {
    match score {
        Some(value) if !value.is_nan() => value.clamp(MIN_SCORE, MAX_SCORE),
        _ => MIN_SCORE,
    }
}
