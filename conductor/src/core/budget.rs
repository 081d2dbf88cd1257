//! Run deadline helpers checked at stage boundaries.

use std::time::{Duration, Instant};

/// Time left until `deadline`, or `None` when there is no deadline.
///
/// Returns `Some(Duration::ZERO)` once the deadline has passed.
pub fn remaining_budget(deadline: Option<Instant>, now: Instant) -> Option<Duration> {
    deadline.map(|deadline| deadline.saturating_duration_since(now))
}

/// True if a deadline exists and has been reached.
pub fn deadline_expired(deadline: Option<Instant>, now: Instant) -> bool {
    remaining_budget(deadline, now).is_some_and(|remaining| remaining.is_zero())
}

/// Deadline for a run started at `started`. Zero seconds means unbounded.
pub fn run_deadline(started: Instant, timeout_secs: u64) -> Option<Instant> {
    if timeout_secs == 0 {
        return None;
    }
    started.checked_add(Duration::from_secs(timeout_secs))
}
