// Datagram networking layer: UDP multicast for the shared chat, unicast for private chat.

pub mod transport;
pub mod udp;

pub use transport::{MessageTransport, TransportError, TransportNotification};
pub use udp::{spawn_transport, TransportConfig, UdpTransport};
