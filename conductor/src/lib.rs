//! Workflow orchestration with quality gates.
//!
//! The conductor turns a free-text task description into an ordered stage
//! plan and drives stage agents through it. The architecture enforces a
//! strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (analysis, plan selection, gate
//!   decisions, metrics aggregation). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (config, process execution, the
//!   durable metrics log, run files).
//! - **[`agents`]**: The [`agents::StageAgent`] seam and its command-backed
//!   implementation.
//!
//! [`pipeline`] runs a plan against registered agents; [`workflow`] composes
//! analysis, selection and execution for the CLI.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod metrics;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workflow;
