use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use super::registry::PaneRegistry;
use super::tmux::PaneHost;
use super::KIND_TERMINAL;

/// How long a reused pane gets between the interrupt and the new command.
/// A process that ignores the interrupt can still race the new command;
/// that window is a known limitation of the reuse path, not a guarantee.
pub const REUSE_GRACE: Duration = Duration::from_millis(400);

/// A request for a display surface to run `command` in.
#[derive(Debug, Clone)]
pub struct PaneRequest {
    pub session_id: String,
    pub command: String,
    pub cwd: Option<PathBuf>,
    /// Display title; defaults to the pane's positional index.
    pub title: Option<String>,
    pub kind: String,
    /// Always create a fresh pane instead of reusing the default one.
    pub force_new: bool,
}

impl PaneRequest {
    pub fn terminal(session_id: &str, command: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            command: command.to_string(),
            cwd: None,
            title: None,
            kind: KIND_TERMINAL.to_string(),
            force_new: false,
        }
    }
}

#[derive(Debug)]
pub struct AcquiredPane {
    pub handle: String,
    pub reused: bool,
}

/// Get a pane running the requested command: reuse the default pane when
/// allowed and possible, otherwise split off a new one. Either way the
/// pane ends up titled and registered.
pub async fn acquire_pane(registry: &PaneRegistry, request: &PaneRequest) -> Result<AcquiredPane> {
    let host = registry.host().clone();

    if !request.force_new {
        if let Some(handle) = registry.lookup(None).await? {
            match reuse_pane(host.as_ref(), &handle, request).await {
                Ok(()) => {
                    finish_pane(registry, host.as_ref(), &handle, request).await?;
                    return Ok(AcquiredPane {
                        handle,
                        reused: true,
                    });
                }
                Err(e) => {
                    eprintln!("shellpane: pane reuse failed ({}), creating a new pane", e);
                }
            }
        }
    }

    let handle = host
        .split_pane(&request.command, request.cwd.as_deref())
        .await?;
    finish_pane(registry, host.as_ref(), &handle, request).await?;
    Ok(AcquiredPane {
        handle,
        reused: false,
    })
}

/// Interrupt whatever runs in the pane, give it a grace period to die,
/// clear the surface, then issue the new command.
async fn reuse_pane(host: &dyn PaneHost, handle: &str, request: &PaneRequest) -> Result<()> {
    host.send_interrupt(handle).await?;
    tokio::time::sleep(REUSE_GRACE).await;
    host.send_text(handle, "clear").await?;
    host.send_text(handle, &request.command).await?;
    Ok(())
}

async fn finish_pane(
    registry: &PaneRegistry,
    host: &dyn PaneHost,
    handle: &str,
    request: &PaneRequest,
) -> Result<()> {
    let title = match &request.title {
        Some(title) => title.clone(),
        None => match host.pane_index(handle).await {
            Ok(index) => index.to_string(),
            Err(_) => handle.trim_start_matches('%').to_string(),
        },
    };
    // title is cosmetic; the registry record is what matters
    let _ = host.set_title(handle, &title).await;

    registry.save(&request.session_id, handle, &request.kind)
}
