//! Deterministic, pure logic shared by the conductor.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod analyzer;
pub mod budget;
pub mod code_refs;
pub mod gate;
pub mod metrics;
pub mod plan;
pub mod rules;
pub mod selector;
pub mod types;
