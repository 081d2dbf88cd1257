//! Shared deterministic types for conductor core logic.
//!
//! These types define stable contracts between the analyzer, selector, gate
//! and executor. They must not depend on external state or I/O.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// Classified purpose of a task description.
///
/// Declaration order is the tie-break priority used by the analyzer: when two
/// intents score equally, the one declared first wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Fix,
    Build,
    Review,
    Test,
    Refactor,
    Optimize,
    Validate,
    Explore,
}

impl Intent {
    /// All intents in tie-break priority order.
    pub const PRIORITY: [Intent; 8] = [
        Intent::Fix,
        Intent::Build,
        Intent::Review,
        Intent::Test,
        Intent::Refactor,
        Intent::Optimize,
        Intent::Validate,
        Intent::Explore,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Fix => "fix",
            Intent::Build => "build",
            Intent::Review => "review",
            Intent::Test => "test",
            Intent::Refactor => "refactor",
            Intent::Optimize => "optimize",
            Intent::Validate => "validate",
            Intent::Explore => "explore",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        Intent::PRIORITY
            .into_iter()
            .find(|intent| intent.as_str() == value)
            .ok_or_else(|| anyhow!("unknown intent '{value}'"))
    }
}

/// Ordered complexity tier of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Minimal,
    Standard,
    Detailed,
    Comprehensive,
}

impl Complexity {
    pub const ALL: [Complexity; 4] = [
        Complexity::Minimal,
        Complexity::Standard,
        Complexity::Detailed,
        Complexity::Comprehensive,
    ];

    /// The next tier up, saturating at `Comprehensive`.
    pub fn bumped(self) -> Self {
        match self {
            Complexity::Minimal => Complexity::Standard,
            Complexity::Standard => Complexity::Detailed,
            Complexity::Detailed | Complexity::Comprehensive => Complexity::Comprehensive,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Complexity::Minimal => "minimal",
            Complexity::Standard => "standard",
            Complexity::Detailed => "detailed",
            Complexity::Comprehensive => "comprehensive",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Complexity {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        Complexity::ALL
            .into_iter()
            .find(|tier| tier.as_str() == value)
            .ok_or_else(|| anyhow!("unknown complexity '{value}'"))
    }
}

/// Fixed stage identifiers.
///
/// Declaration order is the dependency order: a stage never runs before a
/// stage declared above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Enhance,
    Analyze,
    Plan,
    Architect,
    Design,
    Implement,
    Review,
    Test,
    Document,
}

impl StageName {
    /// Every stage in dependency order.
    pub const ORDER: [StageName; 9] = [
        StageName::Enhance,
        StageName::Analyze,
        StageName::Plan,
        StageName::Architect,
        StageName::Design,
        StageName::Implement,
        StageName::Review,
        StageName::Test,
        StageName::Document,
    ];

    /// Stages whose output is always checked by the quality gate.
    pub const GATED: [StageName; 3] = [StageName::Implement, StageName::Review, StageName::Test];

    pub fn as_str(self) -> &'static str {
        match self {
            StageName::Enhance => "enhance",
            StageName::Analyze => "analyze",
            StageName::Plan => "plan",
            StageName::Architect => "architect",
            StageName::Design => "design",
            StageName::Implement => "implement",
            StageName::Review => "review",
            StageName::Test => "test",
            StageName::Document => "document",
        }
    }

    pub fn is_gated(self) -> bool {
        StageName::GATED.contains(&self)
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        StageName::ORDER
            .into_iter()
            .find(|stage| stage.as_str() == value)
            .ok_or_else(|| anyhow!("unknown stage '{value}'"))
    }
}

/// How much a stage agent is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageMode {
    Full,
    Quick,
}

/// Recorded status of one stage attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Success,
    Failed,
    Skipped,
}

/// Lifecycle status of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Succeeded,
    Failed,
    Aborted,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

/// Opaque handle to content produced by a stage agent.
///
/// The content itself is owned by the agent; the conductor only passes the
/// handle forward to later stages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(pub String);

impl ArtifactRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inclusive 1-based line range. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

impl LineRange {
    /// Build a range, swapping the bounds if they were given in reverse.
    pub fn new(a: u32, b: u32) -> Self {
        Self {
            start: a.min(b),
            end: a.max(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_order_matches_declaration_order() {
        let mut sorted = StageName::ORDER;
        sorted.sort();
        assert_eq!(sorted, StageName::ORDER);
    }

    #[test]
    fn stage_names_parse_from_their_display_form() {
        for stage in StageName::ORDER {
            assert_eq!(stage.to_string().parse::<StageName>().expect("parse"), stage);
        }
        assert!("deploy".parse::<StageName>().is_err());
    }

    #[test]
    fn complexity_bump_saturates() {
        assert_eq!(Complexity::Minimal.bumped(), Complexity::Standard);
        assert_eq!(Complexity::Comprehensive.bumped(), Complexity::Comprehensive);
    }

    #[test]
    fn line_range_normalizes_reversed_bounds() {
        assert_eq!(LineRange::new(878, 751), LineRange { start: 751, end: 878 });
    }

    #[test]
    fn stage_name_serializes_snake_case() {
        let json = serde_json::to_string(&StageName::Implement).expect("json");
        assert_eq!(json, "\"implement\"");
    }
}
