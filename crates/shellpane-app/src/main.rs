use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;

use shellpane_app::{run_host, Config, HostOptions};
use shellpane_ipc::ControlClient;
use shellpane_panes::{acquire_pane, FileStore, PaneRegistry, PaneRequest, Tmux};
use shellpane_types::ControlRequest;

#[derive(Parser)]
#[command(
    name = "shellpane",
    version,
    about = "Controllable shell sessions hosted in tmux panes"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a session host process (normally launched inside a pane)
    Host {
        #[arg(long)]
        session_id: String,
        #[arg(long)]
        shell: Option<String>,
        #[arg(long)]
        cwd: Option<PathBuf>,
    },
    /// Create (or reuse) a pane running a new session
    Spawn {
        session_id: String,
        /// Always create a fresh pane instead of reusing the default one
        #[arg(long)]
        force_new: bool,
        /// Pane title; defaults to the pane's positional index
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        cwd: Option<PathBuf>,
    },
    /// List live registered panes
    List,
    /// Close a session and destroy its pane
    Close { session_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Host {
            session_id,
            shell,
            cwd,
        } => {
            let options = HostOptions {
                session_id,
                shell,
                cwd,
                socket_path: None,
            };
            run_host(options, &config).await
        }
        Commands::Spawn {
            session_id,
            force_new,
            title,
            cwd,
        } => spawn_session(&session_id, force_new, title, cwd).await,
        Commands::List => list_panes().await,
        Commands::Close { session_id } => close_session(&session_id).await,
    }
}

async fn registry() -> Result<PaneRegistry> {
    let host = Tmux::new()
        .await
        .context("tmux is required to manage panes")?;
    Ok(PaneRegistry::new(
        Box::new(FileStore::default_location()?),
        Arc::new(host),
    ))
}

async fn spawn_session(
    session_id: &str,
    force_new: bool,
    title: Option<String>,
    cwd: Option<PathBuf>,
) -> Result<()> {
    let registry = registry().await?;

    let exe = std::env::current_exe().context("cannot locate the shellpane binary")?;
    let mut command = format!("{} host --session-id '{}'", exe.display(), session_id);
    if let Some(cwd) = &cwd {
        command.push_str(&format!(" --cwd '{}'", cwd.display()));
    }

    let mut request = PaneRequest::terminal(session_id, &command);
    request.force_new = force_new;
    request.title = title;
    request.cwd = cwd;

    let acquired = acquire_pane(&registry, &request).await?;
    let verb = if acquired.reused { "reused" } else { "created" };
    println!(
        "{} pane {} for session {}",
        verb.green(),
        acquired.handle.cyan(),
        session_id.cyan()
    );
    println!(
        "socket: {}",
        shellpane_ipc::socket_path(session_id).display()
    );
    Ok(())
}

async fn list_panes() -> Result<()> {
    let registry = registry().await?;
    let records = registry.list().await?;
    if records.is_empty() {
        println!("no live panes");
        return Ok(());
    }
    for record in records {
        println!(
            "{}  {}  {}  {}",
            record.session_id.cyan(),
            record.pane_handle,
            record.kind,
            record.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

async fn close_session(session_id: &str) -> Result<()> {
    // Ask the session to shut down cleanly; a dead session is fine too.
    if let Ok(mut client) = ControlClient::connect(session_id).await {
        let _ = client.send(&ControlRequest::Close).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    let registry = registry().await?;
    registry.remove(session_id).await?;
    println!("{} session {}", "closed".green(), session_id.cyan());
    Ok(())
}
