//! A chat participant as seen by this instance.

use std::time::Instant;

use lanchat_shared::types::{PeerAddress, PeerCode};

/// A peer on the chat, local or remote.
///
/// Peers are plain values. The copy held by the registry is the only one
/// that counts, changes go through
/// [`PeerRegistry::update`](crate::registry::PeerRegistry::update).
#[derive(Debug, Clone)]
pub struct Peer {
    /// Unique code, never changes.
    pub code: PeerCode,
    pub nick: String,
    /// Non-empty exactly when `away` is set.
    pub away_message: String,
    pub away: bool,
    pub ip_address: String,
    pub host_name: Option<String>,
    pub operating_system: String,
    pub client: String,
    /// When we last heard an IDLE (or logon) from this peer.
    pub last_heartbeat: Instant,
    /// Unix millis when the peer logged on.
    pub logon_time: i64,
    pub online: bool,
    pub writing: bool,
    /// The entry for this instance.
    pub is_self: bool,
    /// 0 when the peer has no private chat.
    pub private_chat_port: u16,
    pub tcp_chat_port: u16,
    pub tcp_enabled: bool,
    /// A private chat window has been created for this peer.
    pub private_chat_open: bool,
    /// An unread private message is waiting.
    pub new_private_message: bool,
}

impl Peer {
    pub fn new(nick: impl Into<String>, code: PeerCode) -> Self {
        Self {
            code,
            nick: nick.into(),
            away_message: String::new(),
            away: false,
            ip_address: String::new(),
            host_name: None,
            operating_system: String::new(),
            client: String::new(),
            last_heartbeat: Instant::now(),
            logon_time: chrono::Utc::now().timestamp_millis(),
            online: true,
            writing: false,
            is_self: false,
            private_chat_port: 0,
            tcp_chat_port: 0,
            tcp_enabled: false,
            private_chat_open: false,
            new_private_message: false,
        }
    }

    /// Mark the peer as away with the given message, or back if the message
    /// is empty.
    pub fn set_away(&mut self, away_message: &str) {
        self.away = !away_message.is_empty();
        self.away_message = away_message.to_string();
    }

    /// Where private chat lines for this peer are sent.
    pub fn private_address(&self) -> Option<PeerAddress> {
        if self.private_chat_port == 0 || self.ip_address.is_empty() {
            return None;
        }

        Some(PeerAddress {
            ip: self.ip_address.clone(),
            port: self.private_chat_port,
        })
    }

    /// `host (ip)` when the host name is known, otherwise just the ip.
    pub fn host_info(&self) -> String {
        match &self.host_name {
            Some(host_name) => format!("{} ({})", host_name, self.ip_address),
            None => self.ip_address.clone(),
        }
    }

    /// Whether the nick is the code placeholder given to colliding peers.
    pub fn has_code_as_nick(&self) -> bool {
        self.nick == self.code.as_nick()
    }
}

impl PartialEq for Peer {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for Peer {}
