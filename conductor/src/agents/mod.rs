//! Stage agent abstraction.
//!
//! The [`StageAgent`] trait decouples the pipeline from whatever produces a
//! stage's artifact. The executor looks agents up in a [`StageAgentRegistry`]
//! keyed by [`StageName`]; tests register scripted agents that return
//! predetermined outputs.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize, Serializer};

use crate::core::types::{ArtifactRef, StageMode, StageName};

pub mod command;
pub mod feedback;

/// Everything an agent gets for one stage attempt.
#[derive(Debug, Clone, Serialize)]
pub struct StageContext {
    pub execution_id: String,
    pub stage: StageName,
    pub task_description: String,
    /// Accepted artifacts of earlier stages, in stage order.
    pub prior_artifacts: BTreeMap<StageName, ArtifactRef>,
    pub mode: StageMode,
    /// Gate feedback from the previous attempt of this stage.
    pub feedback: Option<String>,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Time left in the run budget. Agents are expected to honour it.
    #[serde(rename = "soft_timeout_ms", serialize_with = "serialize_millis")]
    pub soft_timeout: Option<Duration>,
}

fn serialize_millis<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(duration) => {
            serializer.serialize_some(&u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
        }
        None => serializer.serialize_none(),
    }
}

/// Successful agent outcome. Quality travels only in `quality_score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutput {
    pub artifact: ArtifactRef,
    #[serde(default)]
    pub quality_score: Option<f64>,
}

impl StageOutput {
    pub fn new(artifact: impl Into<String>, quality_score: Option<f64>) -> Self {
        Self {
            artifact: ArtifactRef::new(artifact),
            quality_score,
        }
    }
}

/// Produces the artifact for one stage.
///
/// `Err` always means an infrastructure failure; the pipeline does not retry it.
#[async_trait]
pub trait StageAgent: Send + Sync {
    async fn invoke(&self, context: &StageContext) -> Result<StageOutput>;
}

/// Stage agents keyed by stage name.
#[derive(Clone, Default)]
pub struct StageAgentRegistry {
    agents: BTreeMap<StageName, Arc<dyn StageAgent>>,
}

impl StageAgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `agent` for `stage`, replacing any previous one.
    pub fn register(&mut self, stage: StageName, agent: Arc<dyn StageAgent>) {
        self.agents.insert(stage, agent);
    }

    pub fn with(mut self, stage: StageName, agent: impl StageAgent + 'static) -> Self {
        self.register(stage, Arc::new(agent));
        self
    }

    pub fn get(&self, stage: StageName) -> Option<Arc<dyn StageAgent>> {
        self.agents.get(&stage).cloned()
    }

    pub fn stages(&self) -> Vec<StageName> {
        self.agents.keys().copied().collect()
    }
}

impl std::fmt::Debug for StageAgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageAgentRegistry")
            .field("stages", &self.stages())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl StageAgent for Echo {
        async fn invoke(&self, context: &StageContext) -> Result<StageOutput> {
            Ok(StageOutput::new(format!("{}#{}", context.stage, context.attempt), None))
        }
    }

    fn context() -> StageContext {
        StageContext {
            execution_id: "exec-1".to_string(),
            stage: StageName::Plan,
            task_description: "Add a cache".to_string(),
            prior_artifacts: BTreeMap::from([(StageName::Enhance, ArtifactRef::new("enh"))]),
            mode: StageMode::Quick,
            feedback: None,
            attempt: 1,
            soft_timeout: Some(Duration::from_millis(1500)),
        }
    }

    #[tokio::test]
    async fn registry_dispatches_by_stage() {
        let registry = StageAgentRegistry::new().with(StageName::Plan, Echo);
        assert_eq!(registry.stages(), vec![StageName::Plan]);
        assert!(registry.get(StageName::Test).is_none());
        let agent = registry.get(StageName::Plan).expect("agent");
        let output = agent.invoke(&context()).await.expect("invoke");
        assert_eq!(output.artifact.as_str(), "plan#1");
    }

    #[test]
    fn context_serializes_for_external_agents() {
        let value = serde_json::to_value(context()).expect("json");
        assert_eq!(value["stage"], "plan");
        assert_eq!(value["mode"], "quick");
        assert_eq!(value["soft_timeout_ms"], 1500);
        assert_eq!(value["prior_artifacts"]["enhance"], "enh");
        assert!(value["feedback"].is_null());
    }

    #[test]
    fn output_score_is_optional() {
        let output: StageOutput = serde_json::from_str(r#"{"artifact":"a"}"#).expect("parse");
        assert_eq!(output, StageOutput::new("a", None));
    }
}
