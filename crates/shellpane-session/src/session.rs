use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use serde_json::json;
use shellpane_types::{home_dir, OutputSource, SessionError, ShellInfo, FALLBACK_SHELL};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;

use super::detector::CompletionDetector;
use super::logger::SessionLogger;
use super::READ_CHUNK_BYTES;

/// How to start a session's shell process.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub session_id: String,
    /// Shell binary; defaults to $SHELL, then /bin/bash.
    pub shell: Option<String>,
    /// Working directory; defaults to the home directory.
    pub cwd: Option<PathBuf>,
    /// Transcript log directory; no transcript when unset.
    pub log_dir: Option<PathBuf>,
}

/// Driver-owned session state, mutated only by the session event loop.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub is_running: bool,
    pub pid: Option<u32>,
    pub last_exit_code: Option<i32>,
    pub cwd: PathBuf,
}

/// Raw chunks produced by the stdout/stderr reader tasks.
#[derive(Debug)]
pub enum RawOutput {
    Data { source: OutputSource, data: String },
    Eof { source: OutputSource },
}

/// What one raw chunk turned into after boundary detection.
#[derive(Debug, Default)]
pub struct OutputUpdate {
    pub forwarded: String,
    pub completion: Option<CommandCompletion>,
}

#[derive(Debug, Clone)]
pub struct CommandCompletion {
    pub command: String,
    pub exit_code: i32,
    pub duration_ms: u64,
}

struct InFlight {
    command: String,
    issued_at: Instant,
}

/// One interactive shell subprocess plus the state machine around it.
///
/// The shell is started non-interactively with piped stdio and a
/// neutralized prompt, then sources its own rc file once, which keeps the
/// user's aliases and functions without dragging in prompt rendering or
/// job control. Commands are framed with per-command sentinel markers
/// (see [`CompletionDetector`]).
pub struct ShellSession {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    shell_path: String,
    state: SessionState,
    detector: CompletionDetector,
    in_flight: Option<InFlight>,
    logger: Option<SessionLogger>,
    eof_streams: u8,
    closed: bool,
}

impl ShellSession {
    /// Spawn the shell process. Reader tasks for stdout and stderr feed the
    /// returned channel; the caller owns the loop that drains it.
    pub async fn spawn(
        config: &SessionConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<RawOutput>), SessionError> {
        let shell_path = config
            .shell
            .clone()
            .or_else(|| std::env::var("SHELL").ok())
            .unwrap_or_else(|| FALLBACK_SHELL.to_string());

        let cwd = config
            .cwd
            .clone()
            .or_else(home_dir)
            .unwrap_or_else(|| PathBuf::from("/"));

        let mut cmd = Command::new(&shell_path);
        cmd.current_dir(&cwd)
            .env("PS1", "")
            .env("PROMPT", "")
            .env("TERM", "dumb")
            .env_remove("PROMPT_COMMAND")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| SessionError::SpawnFailure(format!("{}: {}", shell_path, e)))?;

        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdin = child.stdin.take();

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(stdout) = stdout {
            spawn_reader(stdout, OutputSource::Stdout, tx.clone());
        }
        if let Some(stderr) = stderr {
            spawn_reader(stderr, OutputSource::Stderr, tx);
        }

        let mut logger = match &config.log_dir {
            Some(dir) => Some(
                SessionLogger::new(&config.session_id, dir)
                    .map_err(|e| SessionError::SpawnFailure(e.to_string()))?,
            ),
            None => None,
        };
        if let Some(logger) = logger.as_mut() {
            let _ = logger.log_event("started", Some(&shell_path));
            let _ = logger.write_metadata(&json!({
                "session_id": config.session_id,
                "shell": shell_path,
                "pid": pid,
                "cwd": cwd.display().to_string(),
            }));
        }

        let mut session = Self {
            child: Some(child),
            stdin,
            shell_path,
            state: SessionState {
                is_running: false,
                pid,
                last_exit_code: None,
                cwd,
            },
            detector: CompletionDetector::new(),
            in_flight: None,
            logger,
            eof_streams: 0,
            closed: false,
        };

        session.initialize_shell().await;
        Ok((session, rx))
    }

    /// Submit a command, wrapped with completion sentinels.
    pub async fn execute(&mut self, command: &str) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::SessionClosed);
        }
        let markers = self.detector.arm();
        let wire = markers.wrap(command);

        let stdin = match self.stdin.as_mut() {
            Some(stdin) => stdin,
            None => {
                self.detector.disarm();
                return Err(SessionError::NotInitialized);
            }
        };
        stdin.write_all(wire.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;

        self.state.is_running = true;
        self.state.last_exit_code = None;
        self.in_flight = Some(InFlight {
            command: command.to_string(),
            issued_at: Instant::now(),
        });
        if let Some(logger) = self.logger.as_mut() {
            let _ = logger.log_input(command);
        }
        Ok(())
    }

    /// Forward raw input to the shell without a command boundary (single
    /// keystrokes, replies to interactive prompts).
    pub async fn write(&mut self, data: &str) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::SessionClosed);
        }
        let stdin = self.stdin.as_mut().ok_or(SessionError::NotInitialized)?;
        stdin.write_all(data.as_bytes()).await?;
        stdin.flush().await?;
        if let Some(logger) = self.logger.as_mut() {
            let _ = logger.log_input(data);
        }
        Ok(())
    }

    /// Run one raw chunk through boundary detection and update the state
    /// machine. Must be called from the single owning loop.
    pub fn handle_output(&mut self, source: OutputSource, data: &str) -> OutputUpdate {
        if let Some(logger) = self.logger.as_mut() {
            let source_name = match source {
                OutputSource::Stdout => "stdout",
                OutputSource::Stderr => "stderr",
                OutputSource::System => "system",
            };
            let _ = logger.log_output(source_name, data);
        }

        let fed = self.detector.feed(source, data);
        let completion = fed.exit_code.and_then(|code| {
            let in_flight = self.in_flight.take()?;
            self.state.is_running = false;
            self.state.last_exit_code = Some(code);
            Some(CommandCompletion {
                command: in_flight.command,
                exit_code: code,
                duration_ms: in_flight.issued_at.elapsed().as_millis() as u64,
            })
        });

        OutputUpdate {
            forwarded: fed.forwarded,
            completion,
        }
    }

    /// Note an EOF on one of the shell's streams; returns any unterminated
    /// output still held back, and flips the session to closed once both
    /// streams are gone.
    pub fn handle_eof(&mut self, source: OutputSource) -> String {
        let leftover = self.detector.flush(source);
        self.eof_streams += 1;
        if self.eof_streams >= 2 {
            self.mark_exited();
        }
        leftover
    }

    /// The shell process is gone: terminal state, no further mutation.
    pub fn mark_exited(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.state.is_running = false;
        self.in_flight = None;
        self.detector.disarm();
        self.stdin = None;
        self.reap();
        if let Some(logger) = self.logger.as_mut() {
            let _ = logger.log_event("exited", None);
        }
    }

    /// Send SIGINT to the shell process and flip to idle at once. Does not
    /// wait for the command to actually die; a command that ignores the
    /// signal can still emit its completion marker later, which the
    /// detector discards as stale.
    pub fn interrupt(&mut self) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::SessionClosed);
        }
        if let Some(pid) = self.state.pid {
            #[cfg(unix)]
            unsafe {
                libc::kill(pid as i32, libc::SIGINT);
            }
        }
        self.state.is_running = false;
        self.in_flight = None;
        self.detector.disarm();
        if let Some(logger) = self.logger.as_mut() {
            let _ = logger.log_event("interrupt", None);
        }
        Ok(())
    }

    /// Terminate the shell and release its handles. Does not wait for the
    /// exit event, which arrives later through the reader EOFs.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        if let Some(pid) = self.state.pid {
            #[cfg(unix)]
            unsafe {
                libc::kill(pid as i32, libc::SIGTERM);
            }
        }
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
        self.closed = true;
        self.state.is_running = false;
        self.in_flight = None;
        self.detector.disarm();
        self.stdin = None;
        self.reap();
        if let Some(logger) = self.logger.as_mut() {
            let _ = logger.log_event("closed", None);
        }
    }

    pub fn shell_info(&self) -> Result<ShellInfo, SessionError> {
        let pid = self.state.pid.ok_or(SessionError::NotInitialized)?;
        Ok(ShellInfo {
            pid,
            shell: self.shell_path.clone(),
            cwd: self.state.cwd.display().to_string(),
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// One-time shell setup: a no-op INT trap so the shell itself survives
    /// interrupts (children still get the default disposition), then the
    /// shell's own startup file so the user's aliases and functions exist
    /// in the session.
    async fn initialize_shell(&mut self) {
        let mut init = String::from("trap ':' INT\n");

        let rc = home_dir().and_then(|home| {
            match PathBuf::from(&self.shell_path)
                .file_name()
                .and_then(|n| n.to_str())
            {
                Some("zsh") => Some(home.join(".zshrc")),
                Some("bash") => Some(home.join(".bashrc")),
                _ => None,
            }
        });
        if let Some(rc) = rc {
            init.push_str(&format!(
                "[ -f '{}' ] && source '{}'\n",
                rc.display(),
                rc.display()
            ));
        }

        if let Some(stdin) = self.stdin.as_mut() {
            let _ = stdin.write_all(init.as_bytes()).await;
            let _ = stdin.flush().await;
        }
    }

    fn reap(&mut self) {
        if let Some(mut child) = self.child.take() {
            tokio::spawn(async move {
                let _ = child.wait().await;
            });
        }
    }
}

fn spawn_reader<R>(mut reader: R, source: OutputSource, tx: mpsc::UnboundedSender<RawOutput>)
where
    R: AsyncReadExt + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK_BYTES];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => {
                    let _ = tx.send(RawOutput::Eof { source });
                    break;
                }
                Ok(n) => {
                    let data = String::from_utf8_lossy(&buf[..n]).to_string();
                    if tx.send(RawOutput::Data { source, data }).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn bash_config(id: &str) -> SessionConfig {
        SessionConfig {
            session_id: id.to_string(),
            shell: Some("/bin/bash".to_string()),
            cwd: Some(std::env::temp_dir()),
            log_dir: None,
        }
    }

    /// Drive the session loop until the in-flight command completes.
    async fn drive_until_complete(
        session: &mut ShellSession,
        rx: &mut mpsc::UnboundedReceiver<RawOutput>,
    ) -> (String, CommandCompletion) {
        let mut collected = String::new();
        loop {
            let raw = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("timed out waiting for shell output")
                .expect("reader channel closed");
            match raw {
                RawOutput::Data { source, data } => {
                    let update = session.handle_output(source, &data);
                    collected.push_str(&update.forwarded);
                    if let Some(completion) = update.completion {
                        return (collected, completion);
                    }
                }
                RawOutput::Eof { source } => {
                    collected.push_str(&session.handle_eof(source));
                }
            }
        }
    }

    #[tokio::test]
    async fn execute_reports_exit_code_and_output() {
        let (mut session, mut rx) = ShellSession::spawn(&bash_config("t-exec")).await.unwrap();
        assert!(!session.state().is_running);

        session.execute("echo ok").await.unwrap();
        assert!(session.state().is_running);
        assert_eq!(session.state().last_exit_code, None);

        let (output, completion) = drive_until_complete(&mut session, &mut rx).await;
        assert_eq!(completion.exit_code, 0);
        assert_eq!(completion.command, "echo ok");
        assert!(output.contains("ok"));
        assert!(!output.contains("__SHELLPANE"));
        assert!(!session.state().is_running);
        assert_eq!(session.state().last_exit_code, Some(0));

        session.close();
    }

    #[tokio::test]
    async fn failing_command_reports_nonzero_exit() {
        let (mut session, mut rx) = ShellSession::spawn(&bash_config("t-fail")).await.unwrap();
        session.execute("false").await.unwrap();
        let (_, completion) = drive_until_complete(&mut session, &mut rx).await;
        assert_eq!(completion.exit_code, 1);
        session.close();
    }

    #[tokio::test]
    async fn interrupt_flips_idle_and_later_command_still_completes() {
        let (mut session, mut rx) = ShellSession::spawn(&bash_config("t-int")).await.unwrap();

        session.execute("sleep 2").await.unwrap();
        assert!(session.state().is_running);

        session.interrupt().unwrap();
        assert!(!session.state().is_running);
        assert_eq!(session.state().last_exit_code, None);

        // The next command's completion must not be confused by anything
        // the interrupted one left behind.
        session.execute("echo after").await.unwrap();
        let (output, completion) = drive_until_complete(&mut session, &mut rx).await;
        assert_eq!(completion.exit_code, 0);
        assert_eq!(completion.command, "echo after");
        assert!(output.contains("after"));
        assert_eq!(session.state().last_exit_code, Some(0));

        session.close();
    }

    #[tokio::test]
    async fn execute_after_close_is_rejected() {
        let (mut session, _rx) = ShellSession::spawn(&bash_config("t-closed")).await.unwrap();
        session.close();
        let err = session.execute("echo no").await.unwrap_err();
        assert!(matches!(err, SessionError::SessionClosed));
    }

    #[tokio::test]
    async fn shell_info_reports_pid_and_shell() {
        let (mut session, _rx) = ShellSession::spawn(&bash_config("t-info")).await.unwrap();
        let info = session.shell_info().unwrap();
        assert!(info.pid > 0);
        assert_eq!(info.shell, "/bin/bash");
        session.close();
    }

    #[tokio::test]
    async fn spawn_failure_for_missing_shell() {
        let config = SessionConfig {
            session_id: "t-missing".to_string(),
            shell: Some("/nonexistent/shell".to_string()),
            ..Default::default()
        };
        let err = ShellSession::spawn(&config).await.err().unwrap();
        assert!(matches!(err, SessionError::SpawnFailure(_)));
    }
}
