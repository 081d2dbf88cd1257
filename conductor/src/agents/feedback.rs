//! Retry feedback rendered for a stage that failed its quality gate.

use anyhow::Result;
use minijinja::{Environment, context};

use crate::core::gate::QualityGateDecision;
use crate::core::types::{ArtifactRef, StageName};

const RETRY_FEEDBACK_TEMPLATE: &str = include_str!("templates/retry_feedback.md");

/// Inputs describing the rejected attempt.
#[derive(Debug, Clone)]
pub struct RetryFeedback<'a> {
    pub stage: StageName,
    pub attempt: u32,
    pub decision: &'a QualityGateDecision,
    pub artifact: Option<&'a ArtifactRef>,
    pub max_retries: u32,
}

/// Template engine wrapper around minijinja.
pub struct FeedbackRenderer {
    env: Environment<'static>,
}

impl FeedbackRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("retry_feedback", RETRY_FEEDBACK_TEMPLATE)
            .expect("retry feedback template should be valid");
        Self { env }
    }

    pub fn render(&self, input: &RetryFeedback<'_>) -> Result<String> {
        let retries_left = input
            .max_retries
            .saturating_add(1)
            .saturating_sub(input.attempt);
        let template = self.env.get_template("retry_feedback")?;
        let rendered = template.render(context! {
            stage => input.stage.as_str(),
            attempt => input.attempt,
            score => input.decision.score.to_string(),
            threshold => input.decision.threshold.to_string(),
            artifact => input.artifact.map(ArtifactRef::as_str),
            retries_left => retries_left,
        })?;
        Ok(rendered)
    }

    /// Plain-text fallback used if the template cannot be rendered.
    pub fn fallback(input: &RetryFeedback<'_>) -> String {
        format!(
            "Attempt {} of the {} stage scored {}, below the required {}.",
            input.attempt, input.stage, input.decision.score, input.decision.threshold
        )
    }
}

impl Default for FeedbackRenderer {
    fn default() -> Self {
        Self::new()
    }
}
