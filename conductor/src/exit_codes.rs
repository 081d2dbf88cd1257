//! Stable exit codes for conductor CLI commands.

/// Command succeeded, or the run succeeded.
pub const OK: i32 = 0;
/// Invalid input, config or execution id, or any other error.
pub const INVALID: i32 = 1;
/// `conductor run` finished with status failed.
pub const RUN_FAILED: i32 = 2;
/// `conductor run` was aborted (cancelled or out of time).
pub const RUN_ABORTED: i32 = 3;
