//! Applies decoded messages from other peers to the chat state.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use lanchat_shared::nick::is_valid_nick;
use lanchat_shared::protocol::{
    ChatText, ClientInfo, FileAbort, FileAccept, FileOffer, MessageBody, TopicPayload, WireMessage,
};
use lanchat_shared::types::{PeerAddress, PeerCode};

use crate::chat_state::TopicMerge;
use crate::controller::Controller;
use crate::format::{byte_to_string, topic_time};
use crate::peer::Peer;

/// Which socket a message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The multicast chat everyone listens to.
    Shared,
    /// Our unicast private chat socket.
    Private,
}

/// How a newly seen peer announced itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arrival {
    LogOn,
    ShowedUp,
    Silent,
}

pub struct MessageDispatcher {
    controller: Arc<Controller>,
}

impl MessageDispatcher {
    pub fn new(controller: Arc<Controller>) -> Self {
        Self { controller }
    }

    /// Handle the echo of a message we sent ourselves.
    ///
    /// Returns `false` if the message came from someone else.
    pub fn handle_own_message(&self, message: &WireMessage, ip_address: &str) -> bool {
        if message.sender != self.controller.me_code() {
            return false;
        }

        match &message.body {
            MessageBody::Logon => self.controller.me_log_on(ip_address),
            MessageBody::Idle if self.controller.is_logged_on() => {
                self.controller.me_idle(ip_address)
            }
            _ => {}
        }
        true
    }

    /// Apply a message from another peer. Callers make sure we are logged on
    /// and the message is not our own.
    pub fn dispatch(&self, message: &WireMessage, ip_address: &str, origin: Origin) {
        let code = message.sender;
        let nick = message.nick.as_str();

        match &message.body {
            MessageBody::Logon => self.user_log_on(code, nick, ip_address),
            MessageBody::Exposing { away_message } => {
                self.user_exposing(code, nick, away_message, ip_address)
            }
            MessageBody::Logoff => self.user_log_off(code),
            MessageBody::Away { away_message } => self.away_changed(code, true, away_message),
            MessageBody::Back => self.away_changed(code, false, ""),
            MessageBody::Expose => {
                self.controller.messages().send_exposing();
                self.controller.messages().send_client();
            }
            MessageBody::NickCrash { nick } => self.nick_crash(nick),
            MessageBody::Writing => self.writing_changed(code, true),
            MessageBody::StoppedWriting => self.writing_changed(code, false),
            MessageBody::GetTopic => {
                self.controller
                    .messages()
                    .send_topic(&self.controller.topic());
            }
            MessageBody::Topic(payload) => self.topic_changed(payload),
            MessageBody::Nick => self.nick_changed(code, nick),
            MessageBody::Idle => self.user_idle(code, ip_address),
            MessageBody::Msg(text) => self.message_arrived(code, text),
            MessageBody::PrivMsg { target, text } => {
                if origin != Origin::Private {
                    debug!(code = %code, "Ignoring private message on the shared chat");
                } else if *target == self.controller.me_code() {
                    self.private_message_arrived(code, text);
                }
            }
            MessageBody::Client(info) => self.client_info(code, info),
            MessageBody::SendFile(offer) => {
                if offer.target == self.controller.me_code() {
                    self.file_offered(code, offer);
                }
            }
            MessageBody::SendFileAccept(accept) => {
                if accept.target == self.controller.me_code() {
                    self.file_accepted(code, accept);
                }
            }
            MessageBody::SendFileAbort(abort) => {
                if abort.target == self.controller.me_code() {
                    self.file_aborted(code, abort);
                }
            }
        }
    }

    fn known_peer(&self, code: PeerCode) -> Option<Peer> {
        let peer = self.controller.registry().find_by_code(code);
        if peer.is_none() {
            debug!(code = %code, "Message from unknown peer, ignoring");
        }
        peer
    }

    /// The nick a new peer ends up with, asking them to change it when it
    /// is ours.
    fn resolve_nick(&self, code: PeerCode, nick: &str) -> String {
        let controller = &self.controller;

        if nick.trim().eq_ignore_ascii_case(&controller.settings().nick()) {
            info!(code = %code, nick = %nick, "Peer uses our nick, sending nick crash");
            controller.messages().send_nick_crash(nick);
            return code.as_nick();
        }

        let taken = controller
            .registry()
            .find_by_nick(nick)
            .is_some_and(|other| !other.is_self && other.code != code);
        if taken {
            info!(code = %code, nick = %nick, "Nick already in use, using code instead");
            return code.as_nick();
        }

        if !is_valid_nick(nick) {
            info!(code = %code, nick = %nick, "Invalid nick, using code instead");
            return code.as_nick();
        }

        nick.to_string()
    }

    fn register_peer(
        &self,
        code: PeerCode,
        nick: &str,
        away_message: &str,
        ip_address: &str,
        arrival: Arrival,
    ) {
        let mut peer = Peer::new(self.resolve_nick(code, nick), code);
        peer.ip_address = ip_address.to_string();
        peer.set_away(away_message);

        // waiters dispatch as soon as they are signalled, so the peer must
        // already be registered
        self.controller.registry().add(peer.clone());
        self.controller.waiting_list().remove(code);

        let msg = self.controller.message_controller();
        match arrival {
            Arrival::LogOn => {
                msg.show_system_message(&format!("{} logged on from {}", peer.nick, ip_address))
            }
            Arrival::ShowedUp => msg.show_system_message(&format!(
                "{} showed up unexpectedly from {}",
                peer.nick, ip_address
            )),
            Arrival::Silent => {
                debug!(code = %code, nick = %peer.nick, "Discovered peer during logon")
            }
        }
    }

    fn user_log_on(&self, code: PeerCode, nick: &str, ip_address: &str) {
        self.register_peer(code, nick, "", ip_address, Arrival::LogOn);
    }

    fn user_exposing(&self, code: PeerCode, nick: &str, away_message: &str, ip_address: &str) {
        let Some(peer) = self.controller.registry().find_by_code(code) else {
            let arrival = if self.controller.chat_state().is_logon_completed() {
                Arrival::ShowedUp
            } else {
                Arrival::Silent
            };
            self.register_peer(code, nick, away_message, ip_address, arrival);
            return;
        };

        if peer.nick != nick {
            self.nick_changed(code, nick);
        }

        let away = !away_message.is_empty();
        if peer.away != away || peer.away_message != away_message {
            self.away_changed(code, away, away_message);
        }
    }

    fn user_log_off(&self, code: PeerCode) {
        let Some(peer) = self.known_peer(code) else {
            return;
        };

        self.controller
            .remove_peer(code, &format!("{} logged off", peer.nick));
    }

    fn away_changed(&self, code: PeerCode, away: bool, away_message: &str) {
        let Some(peer) = self.known_peer(code) else {
            return;
        };

        if let Err(e) = self
            .controller
            .change_away_status(code, away, away_message)
        {
            warn!(code = %code, error = %e, "Could not apply away change");
            return;
        }

        let text = if away {
            format!("{} went away: {}", peer.nick, away_message)
        } else {
            format!("{} came back", peer.nick)
        };

        let msg = self.controller.message_controller();
        msg.show_system_message(&text);
        if peer.private_chat_open {
            msg.show_private_system_message(&peer, &text);
        }
    }

    /// Only a crash naming our current nick exactly is acted on.
    fn nick_crash(&self, nick: &str) {
        let controller = &self.controller;
        if controller.settings().nick() != nick {
            return;
        }

        let code = controller.me_code();
        warn!(nick = %nick, "Nick crash, resetting nick to code");
        controller.change_nick(code, &code.as_nick());
        controller
            .message_controller()
            .show_system_message(&format!("Nick crash, resetting nick to {}", code));
        controller.ui().show_topic(&controller.topic());
    }

    fn writing_changed(&self, code: PeerCode, writing: bool) {
        if self.known_peer(code).is_some() {
            self.controller.change_writing(code, writing);
        }
    }

    fn topic_changed(&self, payload: &TopicPayload) {
        let controller = &self.controller;
        let msg = controller.message_controller();

        match controller.chat_state().merge_topic(payload) {
            TopicMerge::Discovered(topic) => {
                msg.show_system_message(&format!(
                    "Topic is: {} (set by {} at {})",
                    topic.text,
                    topic.nick,
                    topic_time(topic.time)
                ));
            }
            TopicMerge::Changed(topic) => {
                msg.show_system_message(&format!(
                    "{} changed the topic to: {}",
                    topic.nick, topic.text
                ));
            }
            TopicMerge::Removed { nick } => {
                msg.show_system_message(&format!("{} removed the topic", nick));
            }
            TopicMerge::Ignored => return,
        }

        controller.ui().show_topic(&controller.topic());
    }

    fn nick_changed(&self, code: PeerCode, new_nick: &str) {
        let Some(peer) = self.known_peer(code) else {
            return;
        };
        if peer.nick == new_nick {
            return;
        }

        let taken = self
            .controller
            .registry()
            .find_by_nick(new_nick)
            .is_some_and(|other| other.code != code);
        if taken || !is_valid_nick(new_nick) {
            warn!(code = %code, nick = %new_nick, "Rejected nick change");
            return;
        }

        self.controller.change_nick(code, new_nick);

        let text = format!("{} changed nick to {}", peer.nick, new_nick);
        let msg = self.controller.message_controller();
        msg.show_system_message(&text);
        if peer.private_chat_open {
            msg.show_private_system_message(&peer, &text);
        }
    }

    fn user_idle(&self, code: PeerCode, ip_address: &str) {
        let Some(peer) = self.known_peer(code) else {
            return;
        };

        if peer.ip_address != ip_address {
            self.controller
                .message_controller()
                .show_system_message(&format!(
                    "{} changed ip from {} to {}",
                    peer.nick, peer.ip_address, ip_address
                ));
        }

        self.controller.registry().update(code, |peer| {
            peer.ip_address = ip_address.to_string();
            peer.last_heartbeat = Instant::now();
        });
    }

    fn message_arrived(&self, code: PeerCode, text: &ChatText) {
        let Some(peer) = self.known_peer(code) else {
            return;
        };

        if peer.away {
            debug!(nick = %peer.nick, "Ignoring message from away peer");
            return;
        }

        self.controller
            .message_controller()
            .show_user_message(&peer.nick, &text.text, text.color);
        self.controller.ui().notify_message_arrived(&peer, &text.text);
    }

    fn private_message_arrived(&self, code: PeerCode, text: &ChatText) {
        let controller = &self.controller;
        let Some(peer) = self.known_peer(code) else {
            return;
        };

        if controller.me().away {
            warn!(nick = %peer.nick, "Private message while away, ignoring");
            return;
        }
        if peer.away {
            warn!(nick = %peer.nick, "Private message from away peer, ignoring");
            return;
        }
        if peer.private_chat_port == 0 {
            warn!(nick = %peer.nick, "Private message from peer without private chat, ignoring");
            return;
        }

        if !peer.private_chat_open {
            controller.ui().create_private_chat(&peer);
        }

        let Some(peer) = controller.registry().update(code, |peer| {
            peer.private_chat_open = true;
            peer.new_private_message = true;
        }) else {
            return;
        };

        controller
            .message_controller()
            .show_private_user_message(&peer, &text.text, text.color);
        controller
            .ui()
            .notify_private_message_arrived(&peer, &text.text);
    }

    fn client_info(&self, code: PeerCode, info: &ClientInfo) {
        let now = chrono::Utc::now().timestamp_millis();
        let updated = self.controller.registry().update(code, |peer| {
            peer.client = info.client.clone();
            peer.logon_time = now - info.millis_since_logon;
            peer.operating_system = info.operating_system.clone();
            peer.private_chat_port = info.private_chat_port;
            peer.tcp_chat_port = info.tcp_chat_port.unwrap_or(0);
            peer.tcp_enabled = info.tcp_chat_port.is_some();
        });

        if updated.is_none() {
            debug!(code = %code, "Client info from unknown peer, ignoring");
        }
    }

    fn file_offered(&self, code: PeerCode, offer: &FileOffer) {
        let controller = &self.controller;
        let Some(peer) = self.known_peer(code) else {
            return;
        };

        // only the last component, so the file stays in the download dir
        let Some(file_name) = std::path::Path::new(&offer.name).file_name() else {
            warn!(nick = %peer.nick, file = %offer.name, "Ignoring file offer without a file name");
            return;
        };
        let path = controller.settings().download_dir().join(file_name);
        let transfer = controller.transfers().add_receiver(
            code,
            &peer.nick,
            path,
            &offer.name,
            offer.size,
            offer.hash,
        );

        controller
            .message_controller()
            .show_system_message(&format!(
                "{} is trying to send the file {} (#{}) [{}]",
                peer.nick,
                offer.name,
                transfer.id,
                byte_to_string(offer.size)
            ));
        controller.ui().show_transfer(&transfer);
    }

    fn file_accepted(&self, code: PeerCode, accept: &FileAccept) {
        let controller = &self.controller;
        let Some(peer) = self.known_peer(code) else {
            return;
        };

        let Some(transfer) = controller
            .transfers()
            .find_sender(code, &accept.name, accept.hash)
        else {
            warn!(nick = %peer.nick, file = %accept.name, "Accept for a file we did not offer");
            return;
        };

        controller
            .message_controller()
            .show_system_message(&format!("{} accepted sending of {}", peer.nick, accept.name));

        let target = PeerAddress {
            ip: peer.ip_address.clone(),
            port: accept.port,
        };
        controller.start_sending(&transfer, target);
    }

    fn file_aborted(&self, code: PeerCode, abort: &FileAbort) {
        let controller = &self.controller;
        let Some(peer) = self.known_peer(code) else {
            return;
        };
        let msg = controller.message_controller();

        if let Some(sending) = controller
            .transfers()
            .find_sender(code, &abort.name, abort.hash)
        {
            if sending.is_accepted() {
                controller.pump().cancel(&sending);
            }
            controller.transfers().remove(sending.id);
            msg.show_system_message(&format!(
                "{} aborted reception of {}",
                peer.nick, abort.name
            ));
        }

        if let Some(receiving) = controller.transfers().find_receiver(code, &abort.name) {
            if receiving.is_accepted() {
                controller.pump().cancel(&receiving);
            }
            controller.transfers().remove(receiving.id);
            msg.show_system_message(&format!(
                "{} aborted sending of {}",
                peer.nick, abort.name
            ));
        }
    }
}
