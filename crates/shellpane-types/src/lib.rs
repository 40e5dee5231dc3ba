//! Core types shared across the shellpane crates.
//!
//! This crate defines the session wire protocol (newline-delimited JSON over
//! a per-session Unix socket), the output-line model, and the session error
//! enum. The wire shapes here are the external contract: controllers are
//! built against these exact field names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Constants
// ============================================================================

/// Default bound on the in-memory output buffer, in lines.
pub const DEFAULT_BUFFER_LINES: usize = 2000;

/// Shell used when $SHELL is unset.
pub const FALLBACK_SHELL: &str = "/bin/bash";

// ============================================================================
// Output model
// ============================================================================

/// Where a captured output line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputSource {
    Stdout,
    Stderr,
    /// Lines synthesized by shellpane itself (startup notices, errors).
    System,
}

/// One captured line of session output. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputLine {
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub source: OutputSource,
}

/// Metadata about the live shell process behind a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellInfo {
    pub pid: u32,
    pub shell: String,
    pub cwd: String,
}

// ============================================================================
// Wire protocol
// ============================================================================

/// Inbound controller messages, one JSON object per line.
///
/// `update`, `getSelection` and `getContent` are part of the protocol shared
/// with other display kinds; a terminal session accepts them without effect
/// and without error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ControlRequest {
    ExecuteCommand {
        command: String,
    },
    GetOutput {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        line_count: Option<usize>,
        #[serde(default = "default_from_end")]
        from_end: bool,
    },
    Interrupt,
    SetStreaming {
        enabled: bool,
    },
    TerminalInput {
        data: String,
    },
    Close,
    Update {
        #[serde(default)]
        config: serde_json::Value,
    },
    GetSelection,
    GetContent,
}

fn default_from_end() -> bool {
    true
}

/// Outbound session events, broadcast to every connected controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ControlEvent {
    TerminalReady {
        shell_info: ShellInfo,
    },
    /// Pushed once per buffer append, only while streaming is enabled.
    Output {
        chunk: String,
        source: OutputSource,
    },
    /// Reply to `getOutput`: a snapshot of the visible buffer window plus
    /// the monotonic count of lines ever received.
    OutputBuffer {
        lines: Vec<OutputLine>,
        total_available: u64,
    },
    CommandStarted {
        command: String,
    },
    CommandComplete {
        exit_code: i32,
        /// Wall time from command issue to completion detection, in ms.
        duration: u64,
    },
    Error {
        message: String,
    },
    Cancelled {
        reason: String,
    },
}

// ============================================================================
// Errors
// ============================================================================

/// Failures surfaced by the shell session driver.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Operation attempted before the shell process exists.
    #[error("session not initialized")]
    NotInitialized,

    /// Operation attempted after the shell process exited.
    #[error("session closed")]
    SessionClosed,

    /// The shell (or the pane hosting it) could not be started.
    #[error("failed to spawn session: {0}")]
    SpawnFailure(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Session identity
// ============================================================================

/// Caller-chosen session identifier, restricted so it can appear in socket
/// paths and tmux target names without escaping.
pub fn sanitize_session_id(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Resolve the user's home directory from the environment.
pub fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()
        .map(PathBuf::from)
}
