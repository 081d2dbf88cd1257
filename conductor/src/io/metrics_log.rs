//! Durable append-only JSONL log of execution events.
//!
//! A single writer task owns the file. Handles send events over a channel,
//! so concurrent runs never interleave partial lines.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::core::metrics::ExecutionEvent;

const CHANNEL_CAPACITY: usize = 1024;

enum LogMessage {
    Append(ExecutionEvent),
    Flush(oneshot::Sender<Option<String>>),
}

/// Cloneable handle to the metrics log writer.
#[derive(Debug, Clone)]
pub struct MetricsLog {
    path: PathBuf,
    tx: mpsc::Sender<LogMessage>,
}

impl MetricsLog {
    /// Open `path` for appending and start the writer task.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create metrics log dir {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("open metrics log {}", path.display()))?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(run_writer(file, path.to_path_buf(), rx));
        debug!(path = %path.display(), "metrics log opened");
        Ok(Self {
            path: path.to_path_buf(),
            tx,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue one event. Returns once the writer has accepted it.
    pub async fn append(&self, event: ExecutionEvent) -> Result<()> {
        self.tx
            .send(LogMessage::Append(event))
            .await
            .map_err(|_| anyhow!("metrics log writer stopped ({})", self.path.display()))
    }

    /// Wait until every previously queued event is written.
    ///
    /// Reports the first write failure since the last flush.
    pub async fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(LogMessage::Flush(ack_tx))
            .await
            .map_err(|_| anyhow!("metrics log writer stopped ({})", self.path.display()))?;
        match ack_rx.await {
            Ok(None) => Ok(()),
            Ok(Some(err)) => Err(anyhow!(
                "write metrics log {}: {err}",
                self.path.display()
            )),
            Err(_) => Err(anyhow!(
                "metrics log writer stopped ({})",
                self.path.display()
            )),
        }
    }
}

async fn run_writer(
    mut file: tokio::fs::File,
    path: PathBuf,
    mut rx: mpsc::Receiver<LogMessage>,
) {
    let mut pending_error: Option<String> = None;
    while let Some(message) = rx.recv().await {
        match message {
            LogMessage::Append(event) => {
                if let Err(err) = write_line(&mut file, &event).await {
                    warn!(path = %path.display(), err = %err, "failed to append metrics event");
                    pending_error.get_or_insert_with(|| format!("{err:#}"));
                }
            }
            LogMessage::Flush(ack) => {
                // The requester may have gone away; nothing to report then.
                let _ = ack.send(pending_error.take());
            }
        }
    }
    debug!(path = %path.display(), "metrics log writer finished");
}

async fn write_line(file: &mut tokio::fs::File, event: &ExecutionEvent) -> Result<()> {
    let mut line = serde_json::to_string(event).context("serialize metrics event")?;
    line.push('\n');
    file.write_all(line.as_bytes())
        .await
        .context("append metrics event")?;
    file.flush().await.context("flush metrics log")
}

/// Read every event from a metrics log. A missing file has no events.
pub fn load_events(path: &Path) -> Result<Vec<ExecutionEvent>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read metrics log {}", path.display()))?;
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("parse {} line {}", path.display(), index + 1))
        })
        .collect()
}
