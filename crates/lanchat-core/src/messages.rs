//! Outgoing protocol messages.
//!
//! Every message is stamped with our code and current nick. Sends that the
//! user asked for directly report failure as a [`CommandError`], the rest
//! just log and return whether the datagram went out.

use std::sync::Arc;

use tracing::{debug, warn};

use lanchat_net::MessageTransport;
use lanchat_shared::protocol::{
    ChatText, ClientInfo, FileAbort, FileAccept, FileOffer, MessageBody, TopicPayload, WireMessage,
};
use lanchat_shared::types::PeerCode;

use crate::chat_state::Topic;
use crate::error::CommandError;
use crate::peer::Peer;
use crate::registry::PeerRegistry;
use crate::settings::Settings;
use crate::transfers::Transfer;

pub struct NetworkMessages {
    transport: Arc<dyn MessageTransport>,
    settings: Arc<Settings>,
    registry: Arc<PeerRegistry>,
}

impl NetworkMessages {
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        settings: Arc<Settings>,
        registry: Arc<PeerRegistry>,
    ) -> Self {
        Self {
            transport,
            settings,
            registry,
        }
    }

    pub fn transport(&self) -> &Arc<dyn MessageTransport> {
        &self.transport
    }

    fn broadcast_as(&self, nick: String, body: MessageBody) -> bool {
        let message = WireMessage::new(self.settings.code(), nick, body);
        let line = message.encode();
        let sent = self.transport.broadcast(&line);

        if sent {
            debug!(kind = %message.message_type(), "Broadcast message");
        } else {
            warn!(kind = %message.message_type(), "Failed to broadcast message");
        }
        sent
    }

    fn broadcast(&self, body: MessageBody) -> bool {
        self.broadcast_as(self.settings.nick(), body)
    }

    pub fn send_logon(&self) -> bool {
        self.broadcast(MessageBody::Logon)
    }

    pub fn send_logoff(&self) -> bool {
        self.broadcast(MessageBody::Logoff)
    }

    pub fn send_expose(&self) -> bool {
        self.broadcast(MessageBody::Expose)
    }

    /// Answer to EXPOSE, carrying our away message.
    pub fn send_exposing(&self) -> bool {
        let away_message = self
            .registry
            .me()
            .map(|me| me.away_message)
            .unwrap_or_default();
        self.broadcast(MessageBody::Exposing { away_message })
    }

    pub fn send_get_topic(&self) -> bool {
        self.broadcast(MessageBody::GetTopic)
    }

    pub fn send_idle(&self) -> bool {
        self.broadcast(MessageBody::Idle)
    }

    pub fn send_writing(&self) -> bool {
        self.broadcast(MessageBody::Writing)
    }

    pub fn send_stopped_writing(&self) -> bool {
        self.broadcast(MessageBody::StoppedWriting)
    }

    /// Announce a new nick. The header carries the new nick.
    pub fn send_nick(&self, new_nick: &str) -> bool {
        self.broadcast_as(new_nick.to_string(), MessageBody::Nick)
    }

    /// Tell whoever uses `nick` to pick another one.
    pub fn send_nick_crash(&self, nick: &str) -> bool {
        self.broadcast(MessageBody::NickCrash {
            nick: nick.to_string(),
        })
    }

    pub fn send_away(&self, away_message: &str) -> bool {
        self.broadcast(MessageBody::Away {
            away_message: away_message.to_string(),
        })
    }

    pub fn send_back(&self) -> bool {
        self.broadcast(MessageBody::Back)
    }

    /// Assert a topic, used both for changes and for answering GETTOPIC.
    pub fn send_topic(&self, topic: &Topic) -> bool {
        self.broadcast(MessageBody::Topic(TopicPayload {
            nick: topic.nick.clone(),
            time: topic.time,
            text: topic.text.clone(),
        }))
    }

    pub fn send_client(&self) -> bool {
        let Some(me) = self.registry.me() else {
            warn!("Own peer missing, not sending client info");
            return false;
        };

        let now = chrono::Utc::now().timestamp_millis();
        self.broadcast(MessageBody::Client(ClientInfo {
            client: me.client,
            millis_since_logon: now - me.logon_time,
            operating_system: me.operating_system,
            private_chat_port: me.private_chat_port,
            tcp_chat_port: None,
        }))
    }

    pub fn send_chat_message(&self, text: &str) -> Result<(), CommandError> {
        let sent = self.broadcast(MessageBody::Msg(ChatText {
            color: self.settings.own_color(),
            text: text.to_string(),
        }));

        if !sent {
            return Err(CommandError(format!("Failed to send message: {}", text)));
        }
        Ok(())
    }

    pub fn send_private_message(&self, text: &str, peer: &Peer) -> Result<(), CommandError> {
        let failed = || {
            CommandError(format!(
                "Failed to send private message to {}: {}",
                peer.nick, text
            ))
        };

        let target = peer.private_address().ok_or_else(failed)?;
        let message = WireMessage::new(
            self.settings.code(),
            self.settings.nick(),
            MessageBody::PrivMsg {
                target: peer.code,
                text: ChatText {
                    color: self.settings.own_color(),
                    text: text.to_string(),
                },
            },
        );

        if !self.transport.unicast(&message.encode(), &target) {
            warn!(peer = %peer.code, target = %target, "Failed to send private message");
            return Err(failed());
        }
        Ok(())
    }

    /// Offer a file to a peer.
    pub fn send_file(&self, peer: &Peer, transfer: &Transfer) -> Result<(), CommandError> {
        let sent = self.broadcast(MessageBody::SendFile(FileOffer {
            target: peer.code,
            size: transfer.file_size,
            hash: transfer.file_hash,
            name: transfer.file_name.clone(),
        }));

        if !sent {
            return Err(CommandError(format!(
                "Failed to send file to {}: {}",
                peer.nick, transfer.file_name
            )));
        }
        Ok(())
    }

    pub fn send_file_accept(&self, transfer: &Transfer, port: u16) -> Result<(), CommandError> {
        let sent = self.broadcast(MessageBody::SendFileAccept(FileAccept {
            target: transfer.peer,
            port,
            hash: transfer.file_hash,
            name: transfer.file_name.clone(),
        }));

        if !sent {
            return Err(CommandError(format!(
                "Failed to accept file transfer from {}: {}",
                transfer.peer_nick, transfer.file_name
            )));
        }
        Ok(())
    }

    pub fn send_file_abort(&self, peer: PeerCode, file_hash: i32, file_name: &str) -> bool {
        self.broadcast(MessageBody::SendFileAbort(FileAbort {
            target: peer,
            hash: file_hash,
            name: file_name.to_string(),
        }))
    }
}
