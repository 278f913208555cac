//! UDP transport task.
//!
//! The receive loop runs in a dedicated tokio task and forwards every line
//! as a [`TransportNotification`]. Sends go straight to the sockets from the
//! caller's thread through [`MessageTransport`].

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};

use lanchat_shared::constants::{
    DEFAULT_CHAT_PORT, DEFAULT_MULTICAST_GROUP, DEFAULT_PRIVATE_CHAT_PORT, MAX_PACKET_SIZE,
};
use lanchat_shared::types::PeerAddress;

use crate::transport::{MessageTransport, TransportError, TransportNotification};

/// Number of ports tried when the private chat port is taken.
const PRIVATE_PORT_ATTEMPTS: u16 = 50;

/// Configuration for spawning the transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Multicast group shared by every peer.
    pub multicast_group: Ipv4Addr,
    /// Port of the shared chat.
    pub chat_port: u16,
    /// First port tried for the private chat socket.
    pub private_chat_port: u16,
    /// Skip the private chat socket entirely.
    pub private_chat_enabled: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            multicast_group: DEFAULT_MULTICAST_GROUP
                .parse()
                .unwrap_or(Ipv4Addr::new(224, 168, 5, 200)),
            chat_port: DEFAULT_CHAT_PORT,
            private_chat_port: DEFAULT_PRIVATE_CHAT_PORT,
            private_chat_enabled: true,
        }
    }
}

/// Sending half of the UDP transport.
pub struct UdpTransport {
    chat_socket: Arc<UdpSocket>,
    private_socket: Option<Arc<UdpSocket>>,
    group: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
}

impl UdpTransport {
    /// Stop the receive loop. A [`TransportNotification::NetworkDown`] is
    /// sent once it has exited.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl MessageTransport for UdpTransport {
    fn broadcast(&self, line: &str) -> bool {
        send_line(&self.chat_socket, line, self.group)
    }

    fn unicast(&self, line: &str, target: &PeerAddress) -> bool {
        let Some(socket) = &self.private_socket else {
            warn!(target = %target, "Private chat socket not available");
            return false;
        };

        match target.ip.parse::<Ipv4Addr>() {
            Ok(ip) => send_line(socket, line, SocketAddr::V4(SocketAddrV4::new(ip, target.port))),
            Err(e) => {
                warn!(target = %target, error = %e, "Invalid unicast target");
                false
            }
        }
    }

    fn private_port(&self) -> Option<u16> {
        self.private_socket
            .as_ref()
            .and_then(|socket| socket.local_addr().ok())
            .map(|addr| addr.port())
    }
}

fn send_line(socket: &UdpSocket, line: &str, target: SocketAddr) -> bool {
    match socket.try_send_to(line.as_bytes(), target) {
        Ok(_) => {
            trace!(target = %target, line = %line, "Sent datagram");
            true
        }
        Err(e) => {
            error!(target = %target, error = %e, "Failed to send datagram");
            false
        }
    }
}

/// Bind the sockets and spawn the receive loop.
///
/// Returns the sending half and the notification channel. The first
/// notification is always [`TransportNotification::NetworkUp`].
pub async fn spawn_transport(
    config: TransportConfig,
) -> anyhow::Result<(Arc<UdpTransport>, mpsc::Receiver<TransportNotification>)> {
    if !config.multicast_group.is_multicast() {
        return Err(TransportError::InvalidGroup(config.multicast_group.to_string()).into());
    }

    let chat_socket =
        UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.chat_port)).await?;
    chat_socket.join_multicast_v4(config.multicast_group, Ipv4Addr::UNSPECIFIED)?;
    // our own LOGON and IDLE have to come back to us
    chat_socket.set_multicast_loop_v4(true)?;
    let chat_socket = Arc::new(chat_socket);

    info!(
        group = %config.multicast_group,
        port = config.chat_port,
        "Joined multicast group"
    );

    let private_socket = if config.private_chat_enabled {
        let socket = bind_private_socket(config.private_chat_port).await?;
        Some(Arc::new(socket))
    } else {
        info!("Private chat disabled, no private chat socket");
        None
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (notif_tx, notif_rx) = mpsc::channel::<TransportNotification>(256);

    let transport = Arc::new(UdpTransport {
        chat_socket: chat_socket.clone(),
        private_socket: private_socket.clone(),
        group: SocketAddr::V4(SocketAddrV4::new(config.multicast_group, config.chat_port)),
        shutdown_tx,
    });

    let _ = notif_tx.send(TransportNotification::NetworkUp).await;

    tokio::spawn(receive_loop(chat_socket, private_socket, notif_tx, shutdown_rx));

    Ok((transport, notif_rx))
}

/// Bind the private chat socket on the first free port starting at `first`.
pub async fn bind_private_socket(first: u16) -> Result<UdpSocket, TransportError> {
    let last = first.saturating_add(PRIVATE_PORT_ATTEMPTS - 1);

    for port in first..=last {
        match UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(socket) => {
                info!(port = port, "Private chat socket bound");
                return Ok(socket);
            }
            Err(e) => {
                debug!(port = port, error = %e, "Private chat port taken, trying next");
            }
        }
    }

    Err(TransportError::NoFreePort { first, last })
}

async fn receive_loop(
    chat_socket: Arc<UdpSocket>,
    private_socket: Option<Arc<UdpSocket>>,
    notif_tx: mpsc::Sender<TransportNotification>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut chat_buf = vec![0u8; MAX_PACKET_SIZE];
    let mut private_buf = vec![0u8; MAX_PACKET_SIZE];

    loop {
        tokio::select! {
            result = chat_socket.recv_from(&mut chat_buf) => {
                match result {
                    Ok((len, src_addr)) => {
                        if let Some(line) = datagram_to_line(&chat_buf[..len]) {
                            let _ = notif_tx
                                .send(TransportNotification::LineReceived {
                                    line,
                                    ip_address: src_addr.ip().to_string(),
                                })
                                .await;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Error receiving chat datagram");
                    }
                }
            }

            result = recv_private(&private_socket, &mut private_buf) => {
                match result {
                    Ok((len, src_addr)) => {
                        if let Some(line) = datagram_to_line(&private_buf[..len]) {
                            let _ = notif_tx
                                .send(TransportNotification::PrivateLineReceived {
                                    line,
                                    ip_address: src_addr.ip().to_string(),
                                })
                                .await;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Error receiving private datagram");
                    }
                }
            }

            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("Transport shutting down");
                    break;
                }
            }
        }
    }

    let _ = notif_tx.send(TransportNotification::NetworkDown).await;
    info!("Transport receive loop terminated");
}

async fn recv_private(
    socket: &Option<Arc<UdpSocket>>,
    buf: &mut [u8],
) -> std::io::Result<(usize, SocketAddr)> {
    match socket {
        Some(socket) => socket.recv_from(buf).await,
        None => std::future::pending().await,
    }
}

/// Turn a received datagram into a line, dropping padding and line endings.
fn datagram_to_line(data: &[u8]) -> Option<String> {
    let text = match std::str::from_utf8(data) {
        Ok(text) => text,
        Err(e) => {
            warn!(len = data.len(), error = %e, "Dropping datagram that is not UTF-8");
            return None;
        }
    };

    let line = text.trim_end_matches(['\0', '\r', '\n']);
    if line.is_empty() {
        return None;
    }

    Some(line.to_string())
}
