use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

use crate::types::DriverStatus;
use crate::wire::WireClient;
use crate::{DriverError, Result};

const READY_POLL: Duration = Duration::from_millis(200);

// ─── DriverProcess ────────────────────────────────────────────────────────

/// A running `chromedriver --port=<port>` subprocess.
///
/// The child is spawned with `kill_on_drop`, so dropping the handle (for
/// example when a run aborts with an error) also tears down any browsers the
/// driver still owns. Stderr is drained in a background task and surfaced if
/// the driver never becomes ready.
pub(crate) struct DriverProcess {
    child: Child,
    stderr_buf: Arc<Mutex<String>>,
}

impl DriverProcess {
    pub(crate) fn spawn(executable: &Path, port: u16) -> Result<Self> {
        let mut cmd = Command::new(executable);
        cmd.arg(format!("--port={port}"))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            DriverError::Process(format!("failed to start {}: {e}", executable.display()))
        })?;

        let stderr_buf = Arc::new(Mutex::new(String::new()));
        if let Some(stderr) = child.stderr.take() {
            let buf = Arc::clone(&stderr_buf);
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    if let Ok(mut b) = buf.lock() {
                        if !b.is_empty() {
                            b.push('\n');
                        }
                        b.push_str(&line);
                    }
                }
            });
        }

        Ok(Self { child, stderr_buf })
    }

    /// Poll `GET /status` until the driver reports `ready: true`.
    pub(crate) async fn wait_ready(&mut self, wire: &WireClient, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Err(DriverError::Process(format!(
                    "chromedriver exited early ({status}){}",
                    self.stderr_suffix()
                )));
            }

            match wire.get("/status").await {
                Ok(value) => {
                    let status: DriverStatus =
                        serde_json::from_value(value).map_err(|e| DriverError::Malformed {
                            command: "/status".into(),
                            detail: e.to_string(),
                        })?;
                    if status.ready {
                        tracing::debug!(url = wire.base_url(), "chromedriver ready");
                        return Ok(());
                    }
                    tracing::trace!(message = %status.message, "chromedriver not ready yet");
                }
                Err(DriverError::Http(e)) if e.is_connect() => {}
                Err(e) => return Err(e),
            }

            if started.elapsed() >= timeout {
                return Err(DriverError::Process(format!(
                    "chromedriver not ready after {}s{}",
                    timeout.as_secs(),
                    self.stderr_suffix()
                )));
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }

    pub(crate) async fn shutdown(mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::warn!(error = %e, "failed to stop chromedriver");
        }
    }

    fn stderr_suffix(&self) -> String {
        let stderr = self
            .stderr_buf
            .lock()
            .ok()
            .map(|b| b.clone())
            .unwrap_or_default();
        if stderr.is_empty() {
            String::new()
        } else {
            format!("\nstderr: {stderr}")
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
