//! Interfaces to whatever shows the chat, and the formatting of chat lines.

use std::sync::Arc;

use crate::chat_state::Topic;
use crate::format::clock;
use crate::peer::Peer;
use crate::settings::Settings;
use crate::transfers::Transfer;

/// Where chat lines end up.
pub trait ChatWindowSink: Send + Sync {
    fn append_to_chat(&self, text: &str, color: i32);
    fn append_to_private_chat(&self, peer: &Peer, text: &str, color: i32);
}

/// Hooks into the user interface.
pub trait UserInterfaceSink: Send + Sync {
    /// The topic or our own nick or away state changed.
    fn show_topic(&self, topic: &Topic);
    fn notify_message_arrived(&self, peer: &Peer, text: &str);
    fn notify_private_message_arrived(&self, peer: &Peer, text: &str);
    fn clear_chat(&self);
    fn quit(&self);
    /// Called the first time a private message arrives from a peer.
    fn create_private_chat(&self, peer: &Peer);
    fn show_transfer(&self, transfer: &Transfer);
}

/// Formats lines as `[HH:MM:SS] *** text` or `[HH:MM:SS] <nick>: text`
/// and hands them to the chat window.
#[derive(Clone)]
pub struct MessageController {
    chat: Arc<dyn ChatWindowSink>,
    settings: Arc<Settings>,
}

impl MessageController {
    pub fn new(chat: Arc<dyn ChatWindowSink>, settings: Arc<Settings>) -> Self {
        Self { chat, settings }
    }

    pub fn show_system_message(&self, message: &str) {
        let line = format!("{} *** {}", clock(), message);
        self.chat.append_to_chat(&line, self.settings.system_color());
    }

    pub fn show_user_message(&self, nick: &str, message: &str, color: i32) {
        let line = format!("{} <{}>: {}", clock(), nick, message);
        self.chat.append_to_chat(&line, color);
    }

    pub fn show_own_message(&self, message: &str) {
        let line = format!("{} <{}>: {}", clock(), self.settings.nick(), message);
        self.chat.append_to_chat(&line, self.settings.own_color());
    }

    pub fn show_private_system_message(&self, peer: &Peer, message: &str) {
        let line = format!("{} *** {}", clock(), message);
        self.chat
            .append_to_private_chat(peer, &line, self.settings.system_color());
    }

    pub fn show_private_user_message(&self, peer: &Peer, message: &str, color: i32) {
        let line = format!("{} <{}>: {}", clock(), peer.nick, message);
        self.chat.append_to_private_chat(peer, &line, color);
    }

    pub fn show_private_own_message(&self, peer: &Peer, message: &str) {
        let line = format!("{} <{}>: {}", clock(), self.settings.nick(), message);
        self.chat
            .append_to_private_chat(peer, &line, self.settings.own_color());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use lanchat_shared::types::PeerCode;

    use super::*;
    use crate::settings::SettingsData;

    #[derive(Default)]
    struct Lines(Mutex<Vec<(String, i32, Option<PeerCode>)>>);

    impl ChatWindowSink for Lines {
        fn append_to_chat(&self, text: &str, color: i32) {
            self.0.lock().unwrap().push((text.to_string(), color, None));
        }

        fn append_to_private_chat(&self, peer: &Peer, text: &str, color: i32) {
            self.0
                .lock()
                .unwrap()
                .push((text.to_string(), color, Some(peer.code)));
        }
    }

    #[test]
    fn test_line_formats() {
        let lines = Arc::new(Lines::default());
        let settings = Arc::new(Settings::new(
            PeerCode(1),
            SettingsData {
                nick: "Me".to_string(),
                own_color: 7,
                system_color: 9,
                ..Default::default()
            },
        ));
        let controller = MessageController::new(lines.clone(), settings);
        let amy = Peer::new("Amy", PeerCode(2));

        controller.show_system_message("Amy logged on from 10.0.0.2");
        controller.show_user_message("Amy", "hi", 3);
        controller.show_own_message("hello");
        controller.show_private_user_message(&amy, "psst", 4);
        controller.show_private_own_message(&amy, "yes?");

        let lines = lines.0.lock().unwrap();
        assert!(lines[0].0.ends_with("] *** Amy logged on from 10.0.0.2"));
        assert_eq!(lines[0].1, 9);
        assert!(lines[1].0.ends_with("] <Amy>: hi"));
        assert_eq!(lines[1].1, 3);
        assert!(lines[2].0.ends_with("] <Me>: hello"));
        assert_eq!(lines[2].1, 7);
        assert_eq!(lines[3].2, Some(PeerCode(2)));
        assert!(lines[4].0.ends_with("] <Me>: yes?"));
    }
}
