//! Execution event tracking shared by concurrent runs.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use tracing::warn;

use crate::core::metrics::{ExecutionEvent, Metrics, summarize_events};
use crate::io::metrics_log::MetricsLog;

/// Buffers events per execution in memory until the run's summary is taken
/// and, when a durable log is attached, appends every event there too.
///
/// Finished runs are released by [`MetricsTracker::take_summary`], so a
/// tracker shared by a long-lived executor only holds in-flight runs.
#[derive(Debug, Default)]
pub struct MetricsTracker {
    events: Mutex<HashMap<String, Vec<ExecutionEvent>>>,
    log: Option<MetricsLog>,
}

impl MetricsTracker {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_log(log: MetricsLog) -> Self {
        Self {
            events: Mutex::default(),
            log: Some(log),
        }
    }

    /// Record one event. Durable-log failures are logged, never propagated.
    pub async fn record(&self, event: ExecutionEvent) {
        self.lock()
            .entry(event.execution_id.clone())
            .or_default()
            .push(event.clone());
        if let Some(log) = &self.log
            && let Err(err) = log.append(event).await
        {
            warn!(err = %err, "failed to queue metrics event");
        }
    }

    /// Events recorded for `execution_id`, in emission order.
    pub fn events(&self, execution_id: &str) -> Vec<ExecutionEvent> {
        self.lock()
            .get(execution_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn summarize(&self, execution_id: &str) -> Option<Metrics> {
        let guard = self.lock();
        let events = guard.get(execution_id)?;
        summarize_events(execution_id, events)
    }

    /// Summarize `execution_id` and drop its buffered events.
    pub fn take_summary(&self, execution_id: &str) -> Option<Metrics> {
        let events = self.lock().remove(execution_id)?;
        summarize_events(execution_id, &events)
    }

    /// Number of executions with buffered events.
    pub fn tracked_executions(&self) -> usize {
        self.lock().len()
    }

    /// Wait for the durable log to persist everything recorded so far.
    pub async fn flush(&self) -> Result<()> {
        match &self.log {
            Some(log) => log.flush().await,
            None => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<ExecutionEvent>>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
