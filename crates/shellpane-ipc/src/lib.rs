// Session control plane
//
// One Unix domain socket per session, address derived from the session id,
// newline-delimited JSON in both directions. Any number of controllers may
// be connected at once; events are broadcast to all of them.

mod client;
mod server;

pub use client::ControlClient;
pub use server::{ControlServer, ServerEvent};

use std::path::PathBuf;

use shellpane_types::sanitize_session_id;

/// Directory holding the per-session control sockets.
///
/// `$SHELLPANE_SOCKET_DIR` overrides; otherwise `$XDG_RUNTIME_DIR/shellpane`,
/// falling back to a per-user directory under the system temp dir.
pub fn socket_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SHELLPANE_SOCKET_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(runtime) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime).join("shellpane");
    }
    std::env::temp_dir().join(format!("shellpane-{}", whoami()))
}

/// Deterministic socket path for a session id, so any process can compute
/// where to dial without a directory lookup.
pub fn socket_path(session_id: &str) -> PathBuf {
    socket_dir().join(format!("{}.sock", sanitize_session_id(session_id)))
}

fn whoami() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}
