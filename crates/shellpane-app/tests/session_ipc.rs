//! End-to-end tests: a real session host (bash behind the control socket)
//! driven the way an external controller would.

use std::path::PathBuf;
use std::time::Duration;

use shellpane_app::{run_host, Config, HostOptions};
use shellpane_ipc::ControlClient;
use shellpane_types::{ControlEvent, ControlRequest};
use tokio::task::JoinHandle;

struct TestHost {
    _dir: tempfile::TempDir,
    socket: PathBuf,
    handle: JoinHandle<anyhow::Result<()>>,
}

async fn start_host(session_id: &str) -> TestHost {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join(format!("{}.sock", session_id));

    let config = Config {
        buffer_lines: 200,
        shell: Some("/bin/bash".to_string()),
        log_dir: None,
    };
    let mut options = HostOptions::new(session_id);
    options.socket_path = Some(socket.clone());
    options.cwd = Some(std::env::temp_dir());

    let handle = tokio::spawn(async move { run_host(options, &config).await });

    TestHost {
        _dir: dir,
        socket,
        handle,
    }
}

async fn connect(host: &TestHost) -> ControlClient {
    // the host binds its socket asynchronously; retry until it is up
    for _ in 0..100 {
        if let Ok(client) = ControlClient::connect_path(&host.socket).await {
            return client;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("session host never came up on {}", host.socket.display());
}

async fn run_command(client: &mut ControlClient, command: &str) -> i32 {
    client
        .send(&ControlRequest::ExecuteCommand {
            command: command.to_string(),
        })
        .await
        .unwrap();
    let event = client
        .wait_for(Duration::from_secs(15), |e| {
            matches!(e, ControlEvent::CommandComplete { .. })
        })
        .await
        .unwrap();
    match event {
        ControlEvent::CommandComplete { exit_code, .. } => exit_code,
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn controller_sees_terminal_ready_on_connect() {
    let host = start_host("ready").await;
    let mut client = connect(&host).await;

    let event = client
        .wait_for(Duration::from_secs(10), |e| {
            matches!(e, ControlEvent::TerminalReady { .. })
        })
        .await
        .unwrap();
    match event {
        ControlEvent::TerminalReady { shell_info } => {
            assert!(shell_info.pid > 0);
            assert_eq!(shell_info.shell, "/bin/bash");
        }
        _ => unreachable!(),
    }

    client.send(&ControlRequest::Close).await.unwrap();
    host.handle.abort();
}

#[tokio::test]
async fn get_output_returns_buffer_snapshot_with_total() {
    let host = start_host("getout").await;
    let mut client = connect(&host).await;

    assert_eq!(run_command(&mut client, "echo a").await, 0);
    assert_eq!(run_command(&mut client, "echo b").await, 0);

    client
        .send(&ControlRequest::GetOutput {
            line_count: Some(2),
            from_end: true,
        })
        .await
        .unwrap();
    let event = client
        .wait_for(Duration::from_secs(10), |e| {
            matches!(e, ControlEvent::OutputBuffer { .. })
        })
        .await
        .unwrap();

    match event {
        ControlEvent::OutputBuffer {
            lines,
            total_available,
        } => {
            assert_eq!(lines.len(), 2);
            assert_eq!(lines[0].content, "a");
            assert_eq!(lines[1].content, "b");
            assert!(total_available >= 2);
        }
        _ => unreachable!(),
    }

    client.send(&ControlRequest::Close).await.unwrap();
    host.handle.abort();
}

#[tokio::test]
async fn streaming_pushes_output_without_polling() {
    let host = start_host("stream").await;
    let mut client = connect(&host).await;

    client
        .send(&ControlRequest::SetStreaming { enabled: true })
        .await
        .unwrap();
    client
        .send(&ControlRequest::ExecuteCommand {
            command: "echo stream-me".to_string(),
        })
        .await
        .unwrap();

    let event = client
        .wait_for(Duration::from_secs(15), |e| {
            matches!(e, ControlEvent::Output { chunk, .. } if chunk.contains("stream-me"))
        })
        .await
        .unwrap();
    assert!(matches!(event, ControlEvent::Output { .. }));

    client.send(&ControlRequest::Close).await.unwrap();
    host.handle.abort();
}

#[tokio::test]
async fn command_lifecycle_events_bracket_execution() {
    let host = start_host("lifecycle").await;
    let mut client = connect(&host).await;

    client
        .send(&ControlRequest::ExecuteCommand {
            command: "true".to_string(),
        })
        .await
        .unwrap();

    let started = client
        .wait_for(Duration::from_secs(10), |e| {
            matches!(e, ControlEvent::CommandStarted { .. })
        })
        .await
        .unwrap();
    match started {
        ControlEvent::CommandStarted { command } => assert_eq!(command, "true"),
        _ => unreachable!(),
    }

    let completed = client
        .wait_for(Duration::from_secs(15), |e| {
            matches!(e, ControlEvent::CommandComplete { .. })
        })
        .await
        .unwrap();
    match completed {
        ControlEvent::CommandComplete { exit_code, .. } => assert_eq!(exit_code, 0),
        _ => unreachable!(),
    }

    client.send(&ControlRequest::Close).await.unwrap();
    host.handle.abort();
}

#[tokio::test]
async fn interrupt_cancels_and_session_stays_usable() {
    let host = start_host("intr").await;
    let mut client = connect(&host).await;

    client
        .send(&ControlRequest::ExecuteCommand {
            command: "sleep 2".to_string(),
        })
        .await
        .unwrap();
    client.send(&ControlRequest::Interrupt).await.unwrap();

    let cancelled = client
        .wait_for(Duration::from_secs(10), |e| {
            matches!(e, ControlEvent::Cancelled { .. })
        })
        .await
        .unwrap();
    assert!(matches!(cancelled, ControlEvent::Cancelled { .. }));

    // a later command still completes, stale markers notwithstanding
    assert_eq!(run_command(&mut client, "echo done").await, 0);

    client.send(&ControlRequest::Close).await.unwrap();
    host.handle.abort();
}

#[tokio::test]
async fn reserved_messages_are_accepted_without_error() {
    let host = start_host("reserved").await;
    let mut client = connect(&host).await;

    client
        .send(&ControlRequest::Update {
            config: serde_json::json!({ "title": "x" }),
        })
        .await
        .unwrap();
    client.send(&ControlRequest::GetSelection).await.unwrap();
    client.send(&ControlRequest::GetContent).await.unwrap();

    // connection must survive; a normal request still answers
    client
        .send(&ControlRequest::GetOutput {
            line_count: None,
            from_end: true,
        })
        .await
        .unwrap();
    let event = client
        .wait_for(Duration::from_secs(10), |e| {
            matches!(e, ControlEvent::OutputBuffer { .. })
        })
        .await
        .unwrap();
    assert!(matches!(event, ControlEvent::OutputBuffer { .. }));

    client.send(&ControlRequest::Close).await.unwrap();
    host.handle.abort();
}

#[tokio::test]
async fn close_shuts_the_session_down() {
    let host = start_host("closing").await;
    let mut client = connect(&host).await;

    client.send(&ControlRequest::Close).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(10), host.handle)
        .await
        .expect("host did not shut down after close");
    assert!(result.unwrap().is_ok());
}
