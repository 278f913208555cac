//! Chat window and user interface hooks backed by the terminal.

use std::io::Write;

use tokio::sync::watch;
use tracing::{debug, trace};

use lanchat_core::{ChatWindowSink, Peer, Topic, Transfer, UserInterfaceSink};
use lanchat_shared::constants::{APP_NAME, APP_VERSION};

/// Prints chat lines to stdout. Private chat lines are prefixed with the
/// peer they belong to.
pub struct TerminalChat;

impl ChatWindowSink for TerminalChat {
    fn append_to_chat(&self, text: &str, _color: i32) {
        println!("{}", text);
    }

    fn append_to_private_chat(&self, peer: &Peer, text: &str, _color: i32) {
        println!("[private {}] {}", peer.nick, text);
    }
}

pub struct TerminalUi {
    quit: watch::Sender<bool>,
}

impl TerminalUi {
    /// The receiver fires once the user asks to quit.
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (quit, quit_rx) = watch::channel(false);
        (Self { quit }, quit_rx)
    }
}

fn write_raw(text: &str) {
    let mut stdout = std::io::stdout();
    let _ = stdout.write_all(text.as_bytes());
    let _ = stdout.flush();
}

/// Title shown in the terminal window.
fn window_title(topic: &Topic) -> String {
    if topic.is_set() {
        format!("{} v{} - Topic: {}", APP_NAME, APP_VERSION, topic.text)
    } else {
        format!("{} v{}", APP_NAME, APP_VERSION)
    }
}

impl UserInterfaceSink for TerminalUi {
    fn show_topic(&self, topic: &Topic) {
        write_raw(&format!("\x1b]0;{}\x07", window_title(topic)));
    }

    fn notify_message_arrived(&self, peer: &Peer, _text: &str) {
        trace!(nick = %peer.nick, "Message arrived");
    }

    fn notify_private_message_arrived(&self, peer: &Peer, _text: &str) {
        // bell
        write_raw("\x07");
        trace!(nick = %peer.nick, "Private message arrived");
    }

    fn clear_chat(&self) {
        write_raw("\x1b[2J\x1b[H");
    }

    fn quit(&self) {
        self.quit.send_replace(true);
    }

    fn create_private_chat(&self, peer: &Peer) {
        println!(
            "[private {}] Private chat opened, answer with /msg {} <text>",
            peer.nick, peer.nick
        );
    }

    fn show_transfer(&self, transfer: &Transfer) {
        debug!(
            id = transfer.id,
            file = %transfer.file_name,
            peer = %transfer.peer_nick,
            status = ?transfer.status,
            percent = transfer.percent(),
            "Transfer changed"
        );
    }
}
