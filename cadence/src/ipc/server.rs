//! Unix domain socket server for IPC
//!
//! The server runs on its own thread with a small tokio runtime. It never
//! touches the runner: every command is forwarded to the UI loop, which owns
//! the runner and answers through a oneshot channel.

use anyhow::{anyhow, Result};
use cadence_core::{Command, Response, SOCKET_PATH};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

pub type Request = (Command, oneshot::Sender<Response>);

/// Starts the server thread and returns the receiving end of its requests.
pub fn spawn() -> Result<mpsc::UnboundedReceiver<Request>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    std::thread::Builder::new()
        .name("cadence-ipc".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                if let Err(e) = start(tx).await {
                    error!("IPC server stopped: {}", e);
                }
            })
        })?;
    Ok(rx)
}

async fn start(requests: mpsc::UnboundedSender<Request>) -> Result<()> {
    // Remove old socket if it exists
    let _ = std::fs::remove_file(SOCKET_PATH);

    let listener = UnixListener::bind(SOCKET_PATH)?;
    info!("IPC server listening on {}", SOCKET_PATH);

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let requests = requests.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, requests).await {
                        error!("Error handling client: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
            }
        }
    }
}

async fn handle_client(stream: UnixStream, requests: mpsc::UnboundedSender<Request>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    reader.read_line(&mut line).await?;
    let response = match serde_json::from_str::<Command>(&line) {
        Ok(command) => {
            let (reply_tx, reply_rx) = oneshot::channel();
            requests
                .send((command, reply_tx))
                .map_err(|_| anyhow!("UI loop has shut down"))?;
            reply_rx
                .await
                .unwrap_or_else(|_| Response::Error("command was dropped".to_string()))
        }
        Err(e) => {
            warn!("Rejected malformed command: {}", e);
            Response::Error(format!("malformed command: {}", e))
        }
    };

    let mut response_json = serde_json::to_vec(&response)?;
    response_json.push(b'\n');
    writer.write_all(&response_json).await?;

    Ok(())
}
