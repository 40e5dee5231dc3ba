use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use shellpane_types::{ControlEvent, ControlRequest};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

/// Controller-side connection to a session socket.
///
/// Reads are bounded by a caller-supplied timeout; the session itself never
/// times out a request.
pub struct ControlClient {
    reader: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl ControlClient {
    /// Dial a session by id, using the deterministic socket address.
    pub async fn connect(session_id: &str) -> Result<Self> {
        let path = crate::socket_path(session_id);
        Self::connect_path(&path)
            .await
            .with_context(|| format!("no session listening for '{}'", session_id))
    }

    pub async fn connect_path(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path)
            .await
            .with_context(|| format!("failed to connect to {}", path.display()))?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half).lines(),
            writer: write_half,
        })
    }

    pub async fn send(&mut self, request: &ControlRequest) -> Result<()> {
        let line = serde_json::to_string(request)?;
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        Ok(())
    }

    /// Wait for the next event, skipping lines that do not parse.
    pub async fn next_event(&mut self, timeout: Duration) -> Result<ControlEvent> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let line = tokio::time::timeout_at(deadline, self.reader.next_line())
                .await
                .context("timed out waiting for session event")??;
            let Some(line) = line else {
                bail!("session closed the connection");
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ControlEvent>(&line) {
                Ok(event) => return Ok(event),
                Err(_) => continue,
            }
        }
    }

    /// Wait for an event matching `pred`, discarding others (streamed
    /// output chunks, command lifecycle notices) until the timeout.
    pub async fn wait_for<F>(&mut self, timeout: Duration, mut pred: F) -> Result<ControlEvent>
    where
        F: FnMut(&ControlEvent) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline
                .checked_duration_since(tokio::time::Instant::now())
                .unwrap_or(Duration::ZERO);
            if remaining.is_zero() {
                bail!("timed out waiting for session event");
            }
            let event = self.next_event(remaining).await?;
            if pred(&event) {
                return Ok(event);
            }
        }
    }
}
