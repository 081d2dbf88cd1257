//! Test-only stage agents and plan builders.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::agents::{StageAgent, StageContext, StageOutput};
use crate::core::plan::{StagePlan, StageSpec};
use crate::core::selector::Preset;
use crate::core::types::{StageMode, StageName};

/// Agent that returns a scripted sequence of quality scores.
///
/// Each call pops the next score and returns the artifact `<stage>-<attempt>`.
/// Clones share the script and the recorded contexts.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAgent {
    script: Arc<Mutex<VecDeque<Option<f64>>>>,
    contexts: Arc<Mutex<Vec<StageContext>>>,
}

impl ScriptedAgent {
    pub fn new(scores: impl IntoIterator<Item = Option<f64>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(scores.into_iter().collect())),
            contexts: Arc::default(),
        }
    }

    pub fn scores(scores: impl IntoIterator<Item = f64>) -> Self {
        Self::new(scores.into_iter().map(Some))
    }

    /// Every context this agent was invoked with, in call order.
    pub fn contexts(&self) -> Vec<StageContext> {
        self.contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn calls(&self) -> usize {
        self.contexts().len()
    }
}

#[async_trait]
impl StageAgent for ScriptedAgent {
    async fn invoke(&self, context: &StageContext) -> Result<StageOutput> {
        self.contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(context.clone());
        let score = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| anyhow!("script exhausted for stage {}", context.stage))?;
        Ok(StageOutput::new(
            format!("{}-{}", context.stage, context.attempt),
            score,
        ))
    }
}

/// Agent that always fails with an infrastructure error.
#[derive(Debug, Clone)]
pub struct FailingAgent {
    message: String,
    calls: Arc<AtomicU32>,
}

impl FailingAgent {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageAgent for FailingAgent {
    async fn invoke(&self, _context: &StageContext) -> Result<StageOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(anyhow!("{}", self.message))
    }
}

/// Agent that succeeds and then cancels the run's token.
#[derive(Debug, Clone)]
pub struct CancellingAgent {
    token: CancellationToken,
    score: f64,
}

impl CancellingAgent {
    pub fn new(token: CancellationToken, score: f64) -> Self {
        Self { token, score }
    }
}

#[async_trait]
impl StageAgent for CancellingAgent {
    async fn invoke(&self, context: &StageContext) -> Result<StageOutput> {
        self.token.cancel();
        Ok(StageOutput::new(
            format!("{}-{}", context.stage, context.attempt),
            Some(self.score),
        ))
    }
}

/// Plan that runs only `active` stages (full mode) and skips the rest.
pub fn gated_plan(active: &[StageName], threshold: f64) -> StagePlan {
    StagePlan {
        preset: Preset::FullSdlc,
        stages: StageName::ORDER
            .into_iter()
            .map(|name| StageSpec {
                name,
                mode: StageMode::Full,
                gated: name.is_gated(),
                skip_reason: (!active.contains(&name)).then(|| "not under test".to_string()),
                threshold: name.is_gated().then_some(threshold),
                best_effort: false,
            })
            .collect(),
        rationale: Vec::new(),
    }
}
