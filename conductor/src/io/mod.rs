//! I/O helpers for conductor commands.

pub mod config;
pub mod init;
pub mod metrics_log;
pub mod process;
pub mod run_log;
