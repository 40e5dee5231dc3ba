//! The session host process: one shell session, its output buffer, and the
//! control socket, wired together on a single event loop.
//!
//! All mutation of the buffer and the session state machine happens here,
//! sequenced by the loop; the reader tasks and the socket accept loop only
//! feed channels. That ordering is what guarantees a streamed `output`
//! event is never observed before the append it mirrors.

use std::path::PathBuf;

use anyhow::{Context, Result};
use shellpane_ipc::{socket_path, ControlServer, ServerEvent};
use shellpane_session::{OutputBuffer, RawOutput, SessionConfig, ShellSession};
use shellpane_types::{ControlEvent, ControlRequest};

use super::config::Config;

/// Arguments for one session host.
#[derive(Debug, Clone)]
pub struct HostOptions {
    pub session_id: String,
    pub shell: Option<String>,
    pub cwd: Option<PathBuf>,
    /// Socket override; derived from the session id when unset.
    pub socket_path: Option<PathBuf>,
}

impl HostOptions {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            shell: None,
            cwd: None,
            socket_path: None,
        }
    }
}

enum Flow {
    Continue,
    Shutdown,
}

/// Run a session to completion: until the shell exits or a controller
/// sends `close`.
pub async fn run_host(options: HostOptions, config: &Config) -> Result<()> {
    let path = options
        .socket_path
        .clone()
        .unwrap_or_else(|| socket_path(&options.session_id));

    let (mut server, mut server_events) = ControlServer::bind(&path)
        .await
        .with_context(|| format!("failed to bind session socket {}", path.display()))?;

    let session_config = SessionConfig {
        session_id: options.session_id.clone(),
        shell: options.shell.clone().or_else(|| config.shell.clone()),
        cwd: options.cwd.clone(),
        log_dir: config.log_dir.clone(),
    };

    // No shell, nothing to control: spawn failure is fatal to the host.
    let (mut session, mut raw_output) = ShellSession::spawn(&session_config)
        .await
        .context("failed to start session shell")?;

    let mut buffer = OutputBuffer::new(config.buffer_lines);
    let mut streaming = false;

    if let Ok(shell_info) = session.shell_info() {
        server.broadcast(&ControlEvent::TerminalReady { shell_info });
    }

    loop {
        tokio::select! {
            raw = raw_output.recv() => {
                match raw {
                    Some(RawOutput::Data { source, data }) => {
                        let update = session.handle_output(source, &data);
                        if !update.forwarded.is_empty() {
                            buffer.append(&update.forwarded, source);
                            if streaming {
                                server.broadcast(&ControlEvent::Output {
                                    chunk: update.forwarded,
                                    source,
                                });
                            }
                        }
                        if let Some(completion) = update.completion {
                            server.broadcast(&ControlEvent::CommandComplete {
                                exit_code: completion.exit_code,
                                duration: completion.duration_ms,
                            });
                        }
                    }
                    Some(RawOutput::Eof { source }) => {
                        let leftover = session.handle_eof(source);
                        if !leftover.is_empty() {
                            buffer.append(&leftover, source);
                            if streaming {
                                server.broadcast(&ControlEvent::Output {
                                    chunk: leftover,
                                    source,
                                });
                            }
                        }
                        if session.is_closed() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            event = server_events.recv() => {
                match event {
                    Some(ServerEvent::Connected { conn_id, writer }) => {
                        server.register(conn_id, writer);
                        // late controllers still learn the shell they drive
                        if let Ok(shell_info) = session.shell_info() {
                            server.send_to(conn_id, &ControlEvent::TerminalReady { shell_info });
                        }
                    }
                    Some(ServerEvent::Disconnected { conn_id }) => {
                        server.unregister(conn_id);
                    }
                    Some(ServerEvent::Request { conn_id, request }) => {
                        let flow = handle_request(
                            conn_id,
                            request,
                            &mut session,
                            &mut buffer,
                            &mut server,
                            &mut streaming,
                        )
                        .await;
                        if matches!(flow, Flow::Shutdown) {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    session.close();
    Ok(())
}

async fn handle_request(
    conn_id: u64,
    request: ControlRequest,
    session: &mut ShellSession,
    buffer: &mut OutputBuffer,
    server: &mut ControlServer,
    streaming: &mut bool,
) -> Flow {
    match request {
        ControlRequest::ExecuteCommand { command } => {
            match session.execute(&command).await {
                Ok(()) => {
                    server.broadcast(&ControlEvent::CommandStarted { command });
                }
                Err(e) => {
                    server.broadcast(&ControlEvent::Error {
                        message: e.to_string(),
                    });
                }
            }
            Flow::Continue
        }
        ControlRequest::GetOutput {
            line_count,
            from_end,
        } => {
            server.send_to(
                conn_id,
                &ControlEvent::OutputBuffer {
                    lines: buffer.get_lines(line_count, from_end),
                    total_available: buffer.total_received(),
                },
            );
            Flow::Continue
        }
        ControlRequest::Interrupt => {
            match session.interrupt() {
                Ok(()) => {
                    server.broadcast(&ControlEvent::Cancelled {
                        reason: "interrupted".to_string(),
                    });
                }
                Err(e) => {
                    server.broadcast(&ControlEvent::Error {
                        message: e.to_string(),
                    });
                }
            }
            Flow::Continue
        }
        ControlRequest::SetStreaming { enabled } => {
            *streaming = enabled;
            Flow::Continue
        }
        ControlRequest::TerminalInput { data } => {
            if let Err(e) = session.write(&data).await {
                server.broadcast(&ControlEvent::Error {
                    message: e.to_string(),
                });
            }
            Flow::Continue
        }
        ControlRequest::Close => {
            session.close();
            Flow::Shutdown
        }
        // Reserved for other display kinds sharing the protocol.
        ControlRequest::Update { .. }
        | ControlRequest::GetSelection
        | ControlRequest::GetContent => Flow::Continue,
    }
}
