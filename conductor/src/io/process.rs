//! Async child-process execution with a deadline and capped output capture.

use std::fmt::Write as _;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Bytes kept from one output stream, plus how many were discarded past the cap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedStream {
    pub bytes: Vec<u8>,
    pub dropped: usize,
}

impl CapturedStream {
    pub fn is_truncated(&self) -> bool {
        self.dropped > 0
    }

    pub fn lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    /// Append the captured text and, when truncated, a `[name: N bytes dropped]` marker.
    pub fn write_section(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "=== {name} ===");
        out.push_str(&self.lossy());
        if self.is_truncated() {
            let _ = write!(out, "\n[{name}: {} bytes dropped]", self.dropped);
        }
        out.push('\n');
    }
}

#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: CapturedStream,
    pub stderr: CapturedStream,
    pub timed_out: bool,
}

/// Spawn `cmd`, feed it `stdin`, and wait at most `timeout` for it to exit.
///
/// Both output pipes are drained by their own tasks while the child runs, so a
/// chatty child never blocks on a full pipe. At most `limit` bytes per stream
/// are kept. A child still running at the deadline is killed and reported
/// with `timed_out`; that is not an `Err`.
#[instrument(skip_all, fields(timeout_ms = timeout.as_millis() as u64, limit))]
pub async fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<Vec<u8>>,
    timeout: Duration,
    limit: usize,
) -> Result<CommandOutput> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|err| {
        error!(err = %err, "spawn failed");
        anyhow!(err).context("spawn command")
    })?;
    debug!(pid = ?child.id(), "child spawned");

    let feeder = match (stdin, child.stdin.take()) {
        (Some(input), Some(mut pipe)) => Some(tokio::spawn(async move {
            pipe.write_all(&input).await?;
            pipe.shutdown().await
        })),
        (Some(_), None) => return Err(anyhow!("child stdin unavailable")),
        (None, _) => None,
    };
    let stdout_reader = tokio::spawn(capture(
        child.stdout.take().context("child stdout unavailable")?,
        limit,
    ));
    let stderr_reader = tokio::spawn(capture(
        child.stderr.take().context("child stderr unavailable")?,
        limit,
    ));

    let (status, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(waited) => (waited.context("wait for child")?, false),
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "deadline passed; killing child");
            child.kill().await.context("kill child")?;
            (child.wait().await.context("reap killed child")?, true)
        }
    };

    if let Some(feeder) = feeder {
        match feeder.await {
            Ok(Ok(())) => {}
            // The child may exit without reading all of its input.
            Ok(Err(err)) => debug!(err = %err, "stdin not fully written"),
            Err(err) => return Err(anyhow!("stdin task panicked: {err}")),
        }
    }
    let stdout = joined(stdout_reader).await.context("capture stdout")?;
    let stderr = joined(stderr_reader).await.context("capture stderr")?;

    if stdout.is_truncated() || stderr.is_truncated() {
        warn!(
            stdout_dropped = stdout.dropped,
            stderr_dropped = stderr.dropped,
            "child output exceeded capture limit"
        );
    }
    debug!(exit_code = ?status.code(), timed_out, "child finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

async fn joined(handle: JoinHandle<Result<CapturedStream>>) -> Result<CapturedStream> {
    handle
        .await
        .map_err(|err| anyhow!("reader task panicked: {err}"))?
}

async fn capture<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> Result<CapturedStream> {
    let mut stream = CapturedStream::default();
    let mut chunk = [0u8; READ_CHUNK_BYTES];
    loop {
        let read = reader.read(&mut chunk).await.context("read child output")?;
        if read == 0 {
            return Ok(stream);
        }
        let room = limit.saturating_sub(stream.bytes.len()).min(read);
        stream.bytes.extend_from_slice(&chunk[..room]);
        stream.dropped += read - room;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn captures_stdout_and_stdin() {
        let output = run_command_with_timeout(
            sh("cat"),
            Some(b"hello".to_vec()),
            Duration::from_secs(10),
            1024,
        )
        .await
        .expect("run");
        assert!(output.status.success());
        assert_eq!(output.stdout.bytes, b"hello");
        assert!(!output.timed_out);
    }

    #[tokio::test]
    async fn bounds_captured_output() {
        let output = run_command_with_timeout(
            sh("printf abcdefghij; printf oops >&2"),
            None,
            Duration::from_secs(10),
            4,
        )
        .await
        .expect("run");
        assert_eq!(output.stdout.bytes, b"abcd");
        assert_eq!(output.stdout.dropped, 6);
        assert_eq!(output.stderr.lossy(), "oops");
        assert!(!output.stderr.is_truncated());

        let mut log = String::new();
        output.stdout.write_section("stdout", &mut log);
        assert_eq!(log, "=== stdout ===\nabcd\n[stdout: 6 bytes dropped]\n");
    }

    #[tokio::test]
    async fn kills_child_after_timeout() {
        let output = run_command_with_timeout(
            sh("exec sleep 5"),
            None,
            Duration::from_millis(100),
            1024,
        )
        .await
        .expect("run");
        assert!(output.timed_out);
        assert!(!output.status.success());
    }

    #[tokio::test]
    async fn reports_non_zero_exit() {
        let output = run_command_with_timeout(sh("exit 3"), None, Duration::from_secs(10), 1024)
            .await
            .expect("run");
        assert_eq!(output.status.code(), Some(3));
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let cmd = Command::new("conductor-test-no-such-program");
        let err = run_command_with_timeout(cmd, None, Duration::from_secs(1), 16)
            .await
            .expect_err("spawn should fail");
        assert!(err.to_string().contains("spawn command"));
    }
}
