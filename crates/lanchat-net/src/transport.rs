//! Transport abstraction used by the chat engine.
//!
//! Sending is synchronous and best effort: a send either hands the datagram
//! to the OS or reports failure, it never blocks waiting for the network.
//! Received lines flow the other way as [`TransportNotification`]s on an
//! mpsc channel.

use lanchat_shared::types::PeerAddress;
use thiserror::Error;

/// Outbound side of the network.
pub trait MessageTransport: Send + Sync {
    /// Send a line to every peer on the shared chat.
    fn broadcast(&self, line: &str) -> bool;

    /// Send a line to a single peer's private chat socket.
    fn unicast(&self, line: &str, target: &PeerAddress) -> bool;

    /// Port of our private chat socket, if private chat is available.
    fn private_port(&self) -> Option<u16>;
}

/// Events sent from the transport task to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportNotification {
    /// A line arrived on the shared chat.
    LineReceived { line: String, ip_address: String },
    /// A line arrived on the private chat socket.
    PrivateLineReceived { line: String, ip_address: String },
    /// The sockets are bound and the multicast group is joined.
    NetworkUp,
    /// The transport stopped listening.
    NetworkDown,
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid multicast group '{0}'")]
    InvalidGroup(String),

    #[error("No free private chat port in {first}..={last}")]
    NoFreePort { first: u16, last: u16 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
