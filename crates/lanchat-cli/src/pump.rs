//! File transfer byte pump over TCP.
//!
//! The receiver listens on an ephemeral port that is announced in
//! SENDFILEACCEPT. The sender connects to it and streams the raw file
//! contents, closing the connection at the end.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use lanchat_core::{FileTransferPump, Transfer, TransferUpdate, TransferUpdates};
use lanchat_shared::PeerAddress;

const CHUNK_SIZE: usize = 8192;

/// How often progress is reported.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// How long the receiver waits for the sender to connect.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Default)]
pub struct TcpPump {
    running: Mutex<HashMap<u32, AbortHandle>>,
}

impl TcpPump {
    pub fn new() -> Self {
        Self::default()
    }

    fn track(&self, id: u32, handle: JoinHandle<()>) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        running.retain(|_, task| !task.is_finished());
        running.insert(id, handle.abort_handle());
    }
}

impl FileTransferPump for TcpPump {
    fn prepare_receive(&self, transfer: &Transfer, updates: TransferUpdates) -> Result<u16, String> {
        let listener = std::net::TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0))
            .and_then(|listener| {
                listener.set_nonblocking(true)?;
                Ok(listener)
            })
            .map_err(|e| e.to_string())?;
        let port = listener.local_addr().map_err(|e| e.to_string())?.port();
        let listener = TcpListener::from_std(listener).map_err(|e| e.to_string())?;

        debug!(id = transfer.id, port, "Waiting for file sender");

        let transfer = transfer.clone();
        let id = transfer.id;
        let handle = tokio::spawn(async move {
            let update = match receive_file(listener, &transfer, &updates).await {
                Ok(()) => {
                    info!(id, file = %transfer.path.display(), "File received");
                    TransferUpdate::Completed { id }
                }
                Err(e) => {
                    warn!(id, error = %e, "Failed to receive file");
                    let _ = tokio::fs::remove_file(&transfer.path).await;
                    TransferUpdate::Failed { id }
                }
            };
            let _ = updates.send(update);
        });

        self.track(id, handle);
        Ok(port)
    }

    fn start_send(&self, transfer: &Transfer, target: PeerAddress, updates: TransferUpdates) {
        let transfer = transfer.clone();
        let id = transfer.id;

        let handle = tokio::spawn(async move {
            let update = match send_file(&transfer, &target, &updates).await {
                Ok(()) => {
                    info!(id, target = %target, "File sent");
                    TransferUpdate::Completed { id }
                }
                Err(e) => {
                    warn!(id, target = %target, error = %e, "Failed to send file");
                    TransferUpdate::Failed { id }
                }
            };
            let _ = updates.send(update);
        });

        self.track(id, handle);
    }

    fn cancel(&self, transfer: &Transfer) {
        let task = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&transfer.id);

        if let Some(task) = task {
            task.abort();
            debug!(id = transfer.id, "Transfer task aborted");
        }
    }
}

async fn receive_file(
    listener: TcpListener,
    transfer: &Transfer,
    updates: &TransferUpdates,
) -> anyhow::Result<()> {
    let (mut stream, peer) = tokio::time::timeout(CONNECT_TIMEOUT, listener.accept())
        .await
        .context("sender did not connect")??;
    debug!(id = transfer.id, peer = %peer, "Sender connected");

    let mut file = tokio::fs::File::create(&transfer.path)
        .await
        .with_context(|| format!("failed to create {}", transfer.path.display()))?;

    let received = copy_with_progress(&mut stream, &mut file, transfer.id, updates).await?;
    if received != transfer.file_size {
        bail!("received {} of {} bytes", received, transfer.file_size);
    }
    Ok(())
}

async fn send_file(
    transfer: &Transfer,
    target: &PeerAddress,
    updates: &TransferUpdates,
) -> anyhow::Result<()> {
    let mut file = tokio::fs::File::open(&transfer.path)
        .await
        .with_context(|| format!("failed to open {}", transfer.path.display()))?;
    let mut stream = TcpStream::connect((target.ip.as_str(), target.port))
        .await
        .with_context(|| format!("failed to connect to {}", target))?;

    copy_with_progress(&mut file, &mut stream, transfer.id, updates).await?;
    stream.shutdown().await?;
    Ok(())
}

/// Copy everything from `reader` to `writer`, reporting progress now and
/// then. Returns the number of bytes copied.
async fn copy_with_progress<R, W>(
    reader: &mut R,
    writer: &mut W,
    id: u32,
    updates: &TransferUpdates,
) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    let mut since_report = 0u64;
    let mut last_report = Instant::now();

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        total += n as u64;
        since_report += n as u64;

        let elapsed = last_report.elapsed();
        if elapsed >= PROGRESS_INTERVAL {
            let speed = (since_report as f64 / elapsed.as_secs_f64()) as u64;
            let _ = updates.send(TransferUpdate::Progress {
                id,
                transferred: total,
                speed,
            });
            since_report = 0;
            last_report = Instant::now();
        }
    }

    writer.flush().await?;
    Ok(total)
}
