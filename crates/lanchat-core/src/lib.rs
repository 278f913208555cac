//! # lanchat-core
//!
//! The chat engine: who is online, who is away or writing, and what the
//! topic is, reconstructed from the unordered datagrams every peer
//! broadcasts.
//!
//! [`ChatEngine`] is the entry point. It owns a [`Controller`] holding the
//! shared state, feeds it decoded messages through the
//! [`MessageDispatcher`] and runs the heartbeat and timeout checks of the
//! [`LivenessMonitor`].

pub mod chat_state;
pub mod commands;
pub mod controller;
pub mod dispatcher;
pub mod engine;
pub mod format;
pub mod identify;
pub mod liveness;
pub mod messages;
pub mod peer;
pub mod registry;
pub mod settings;
pub mod transfers;
pub mod ui;

mod error;

pub use chat_state::{ChatState, Topic, TopicMerge};
pub use commands::CommandParser;
pub use controller::{Collaborators, Controller};
pub use dispatcher::{MessageDispatcher, Origin};
pub use engine::ChatEngine;
pub use error::{CommandError, CoreError, Result};
pub use identify::{IdentificationGate, WaitingList};
pub use liveness::LivenessMonitor;
pub use peer::Peer;
pub use registry::{PeerRegistry, RegistryEvent};
pub use settings::{generate_code, Settings, SettingsData};
pub use transfers::{
    Direction, FileTransferPump, Transfer, TransferList, TransferStatus, TransferUpdate,
    TransferUpdates,
};
pub use ui::{ChatWindowSink, MessageController, UserInterfaceSink};
