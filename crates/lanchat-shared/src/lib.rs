// Types, constants and the wire codec shared by every LanChat crate.

pub mod constants;
pub mod error;
pub mod nick;
pub mod protocol;
pub mod types;

pub use error::DecodeError;
pub use protocol::{
    ChatText, ClientInfo, FileAbort, FileAccept, FileOffer, MessageBody, MessageType, TopicPayload,
    WireMessage,
};
pub use types::{PeerAddress, PeerCode};
