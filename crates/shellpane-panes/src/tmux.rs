/// Tmux-backed pane host
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

/// The external pane-hosting multiplexer, reduced to the operations the
/// registry and the spawner need. All calls are opaque, possibly-failing
/// subprocess invocations.
#[async_trait]
pub trait PaneHost: Send + Sync {
    /// Split off a new pane running `command`, returning its handle.
    async fn split_pane(&self, command: &str, cwd: Option<&Path>) -> Result<String>;

    /// Round-trip liveness check: ask the multiplexer to echo the handle
    /// back. False means the pane is gone (or the multiplexer is).
    async fn verify_pane(&self, handle: &str) -> bool;

    /// Positional index of the pane in its window.
    async fn pane_index(&self, handle: &str) -> Result<usize>;

    /// Set the pane's display title.
    async fn set_title(&self, handle: &str, title: &str) -> Result<()>;

    /// Type `text` into the pane followed by Enter.
    async fn send_text(&self, handle: &str, text: &str) -> Result<()>;

    /// Send an interrupt keystroke (C-c) to the pane.
    async fn send_interrupt(&self, handle: &str) -> Result<()>;

    /// Capture the pane's currently rendered lines.
    async fn capture_pane(&self, handle: &str) -> Result<String>;

    /// Destroy the pane.
    async fn kill_pane(&self, handle: &str) -> Result<()>;

    fn host_name(&self) -> &str;
}

/// Pane host backed by the tmux CLI.
pub struct Tmux;

impl Tmux {
    /// Create a tmux pane host, verifying tmux is available.
    pub async fn new() -> Result<Self> {
        let output = Command::new("tmux").arg("-V").output().await?;
        if !output.status.success() {
            bail!("tmux command failed - ensure tmux is installed and working");
        }
        Ok(Self)
    }

    /// Run a tmux command and return stdout.
    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("tmux").args(args).output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("tmux command failed: {}", stderr);
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl PaneHost for Tmux {
    async fn split_pane(&self, command: &str, cwd: Option<&Path>) -> Result<String> {
        let mut args = vec!["split-window", "-d", "-P", "-F", "#{pane_id}"];
        let cwd_str;
        if let Some(cwd) = cwd {
            cwd_str = cwd.display().to_string();
            args.push("-c");
            args.push(&cwd_str);
        }
        args.push(command);

        let output = self.run(&args).await?;
        let handle = output.trim().to_string();
        if handle.is_empty() {
            bail!("tmux did not report a pane id for the new pane");
        }
        Ok(handle)
    }

    async fn verify_pane(&self, handle: &str) -> bool {
        match self
            .run(&["display-message", "-t", handle, "-p", "#{pane_id}"])
            .await
        {
            Ok(output) => output.trim() == handle,
            Err(_) => false,
        }
    }

    async fn pane_index(&self, handle: &str) -> Result<usize> {
        let output = self
            .run(&["display-message", "-t", handle, "-p", "#{pane_index}"])
            .await?;
        output
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("unexpected pane index: {}", output.trim()))
    }

    async fn set_title(&self, handle: &str, title: &str) -> Result<()> {
        self.run(&["select-pane", "-t", handle, "-T", title]).await?;
        Ok(())
    }

    async fn send_text(&self, handle: &str, text: &str) -> Result<()> {
        // -l sends the text literally; Enter is a separate keystroke
        self.run(&["send-keys", "-t", handle, "-l", "--", text])
            .await?;
        self.run(&["send-keys", "-t", handle, "Enter"]).await?;
        Ok(())
    }

    async fn send_interrupt(&self, handle: &str) -> Result<()> {
        self.run(&["send-keys", "-t", handle, "C-c"]).await?;
        Ok(())
    }

    async fn capture_pane(&self, handle: &str) -> Result<String> {
        self.run(&["capture-pane", "-t", handle, "-p"]).await
    }

    async fn kill_pane(&self, handle: &str) -> Result<()> {
        self.run(&["kill-pane", "-t", handle]).await?;
        Ok(())
    }

    fn host_name(&self) -> &str {
        "tmux"
    }
}
