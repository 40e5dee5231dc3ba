use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use shellpane_types::{ControlEvent, ControlRequest};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;

/// Connection lifecycle and inbound traffic, delivered to the owning loop.
#[derive(Debug)]
pub enum ServerEvent {
    Connected {
        conn_id: u64,
        writer: mpsc::UnboundedSender<String>,
    },
    Request {
        conn_id: u64,
        request: ControlRequest,
    },
    Disconnected {
        conn_id: u64,
    },
}

/// Socket server for one session.
///
/// The accept loop and per-connection reader/writer tasks run in the
/// background; all bookkeeping (the broadcast set) is mutated only by the
/// loop that drains the [`ServerEvent`] channel, so the session process
/// needs no locking.
pub struct ControlServer {
    socket_path: PathBuf,
    peers: HashMap<u64, mpsc::UnboundedSender<String>>,
}

impl ControlServer {
    /// Bind the session socket, replacing a stale socket file if the
    /// previous owner is gone.
    pub async fn bind(
        socket_path: &Path,
    ) -> io::Result<(Self, mpsc::UnboundedReceiver<ServerEvent>)> {
        if socket_path.exists() {
            match UnixStream::connect(socket_path).await {
                Ok(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::AddrInUse,
                        format!(
                            "another session is already listening on {}",
                            socket_path.display()
                        ),
                    ));
                }
                Err(_) => {
                    // nobody home, safe to reclaim
                    std::fs::remove_file(socket_path)?;
                }
            }
        }

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(socket_path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(accept_loop(listener, events_tx));

        Ok((
            Self {
                socket_path: socket_path.to_path_buf(),
                peers: HashMap::new(),
            },
            events_rx,
        ))
    }

    pub fn register(&mut self, conn_id: u64, writer: mpsc::UnboundedSender<String>) {
        self.peers.insert(conn_id, writer);
    }

    pub fn unregister(&mut self, conn_id: u64) {
        self.peers.remove(&conn_id);
    }

    pub fn connection_count(&self) -> usize {
        self.peers.len()
    }

    /// Send an event to a single controller. A dead peer is evicted, never
    /// an error.
    pub fn send_to(&mut self, conn_id: u64, event: &ControlEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(_) => return,
        };
        if let Some(writer) = self.peers.get(&conn_id) {
            if writer.send(line).is_err() {
                self.peers.remove(&conn_id);
            }
        }
    }

    /// Broadcast an event to every connected controller, dropping peers
    /// whose writer task has gone away.
    pub fn broadcast(&mut self, event: &ControlEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(_) => return,
        };
        self.peers.retain(|_, writer| writer.send(line.clone()).is_ok());
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

async fn accept_loop(listener: UnixListener, events: mpsc::UnboundedSender<ServerEvent>) {
    let mut next_conn_id: u64 = 1;
    loop {
        let (stream, _addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(_) => break,
        };
        let conn_id = next_conn_id;
        next_conn_id += 1;

        let (read_half, mut write_half) = stream.into_split();

        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            while let Some(line) = writer_rx.recv().await {
                if write_half.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if write_half.write_all(b"\n").await.is_err() {
                    break;
                }
            }
        });

        if events
            .send(ServerEvent::Connected {
                conn_id,
                writer: writer_tx,
            })
            .is_err()
        {
            break;
        }

        let events = events.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<ControlRequest>(line) {
                            Ok(request) => {
                                if events
                                    .send(ServerEvent::Request { conn_id, request })
                                    .is_err()
                                {
                                    break;
                                }
                            }
                            Err(e) => {
                                // malformed message: drop it, keep the connection
                                eprintln!("shellpane: ignoring malformed control message: {}", e);
                            }
                        }
                    }
                    Ok(None) | Err(_) => break,
                }
            }
            let _ = events.send(ServerEvent::Disconnected { conn_id });
        });
    }
}
