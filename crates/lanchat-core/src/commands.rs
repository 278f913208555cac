//! Slash commands typed by the user.
//!
//! Every problem is reported as exactly one system message in the chat.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use lanchat_shared::constants::{APP_NAME, APP_VERSION, APP_WEB, AUTHOR_MAIL, AUTHOR_NAME};
use lanchat_shared::nick::is_valid_nick;

use crate::controller::Controller;
use crate::error::CommandError;
use crate::format::{byte_to_string, how_long_from_now, topic_time};
use crate::peer::Peer;
use crate::transfers::{incremented_path, Direction, Transfer};

pub struct CommandParser {
    controller: Arc<Controller>,
}

impl CommandParser {
    pub fn new(controller: Arc<Controller>) -> Self {
        Self { controller }
    }

    fn show(&self, message: &str) {
        self.controller
            .message_controller()
            .show_system_message(message);
    }

    /// Run a line starting with `/`.
    pub fn parse(&self, line: &str) {
        let rest = line.strip_prefix('/').unwrap_or(line);
        let command = rest.split(' ').next().unwrap_or_default();
        let args = &rest[command.len()..];

        debug!(command = %command, "Parsing command");

        match command {
            "topic" => self.cmd_topic(args),
            "away" => self.cmd_away(args),
            "back" => self.cmd_back(),
            "clear" => self.controller.ui().clear_chat(),
            "about" => self.cmd_about(),
            "help" => self.show_commands(),
            "whois" => self.cmd_whois(args),
            "send" => self.cmd_send(args),
            "receive" => self.cmd_receive(args),
            "reject" => self.cmd_reject(args),
            "cancel" => self.cmd_cancel(args),
            "msg" => self.cmd_msg(args),
            "nick" => self.cmd_nick(args),
            "users" => self.cmd_users(),
            "transfers" => self.cmd_transfers(),
            "quit" => self.controller.ui().quit(),
            _ if command.starts_with('/') => self.cmd_slash(rest),
            _ => self.show(&format!(
                "Unknown command '{}'. Type /help for a list of commands",
                command
            )),
        }
    }

    fn cmd_topic(&self, args: &str) {
        if !args.is_empty() {
            if let Err(e) = self.fix_topic(args) {
                self.show(&e.to_string());
            }
            return;
        }

        let topic = self.controller.topic();
        if topic.is_set() {
            self.show(&format!(
                "Topic is: {} (set by {} at {})",
                topic.text,
                topic.nick,
                topic_time(topic.time)
            ));
        } else {
            self.show("No topic set");
        }
    }

    /// Change the topic if the trimmed text differs from the current one.
    pub fn fix_topic(&self, text: &str) -> Result<(), CommandError> {
        let text = text.trim();
        if text == self.controller.topic().text.trim() {
            return Ok(());
        }

        self.controller.change_topic(text)?;
        if text.is_empty() {
            self.show("You removed the topic");
        } else {
            self.show(&format!("You changed the topic to: {}", text));
        }
        self.controller.ui().show_topic(&self.controller.topic());
        Ok(())
    }

    fn cmd_away(&self, args: &str) {
        let me = self.controller.me();
        if me.away {
            self.show(&format!(
                "/away - you are already away: '{}'",
                me.away_message
            ));
            return;
        }

        if args.trim().is_empty() {
            self.show("/away - missing argument <away message>");
            return;
        }

        if let Err(e) = self.controller.go_away(args.trim()) {
            self.show(&e.to_string());
        }
    }

    fn cmd_back(&self) {
        if !self.controller.me().away {
            self.show("/back - you are not away");
            return;
        }

        if let Err(e) = self.controller.come_back() {
            self.show(&e.to_string());
        }
    }

    fn cmd_about(&self) {
        self.show(&format!(
            "This is {} v{}, by {} - {} - {}",
            APP_NAME, APP_VERSION, AUTHOR_NAME, AUTHOR_MAIL, APP_WEB
        ));
    }

    pub fn show_commands(&self) {
        self.show(&format!(
            "{app} commands:\n\
             /about - information about {app}\n\
             /away <away message> - set status to away\n\
             /back - set status to not away\n\
             /cancel <nick> <id> - cancel an ongoing file transfer with a user\n\
             /clear - clear all the text from the chat\n\
             /help - show this help message\n\
             /msg <nick> <msg> - send a private message to a user\n\
             /nick <new nick> - changes your nick name\n\
             /quit - quit from the chat\n\
             /receive <nick> <id> - accept a file transfer request from a user\n\
             /reject <nick> <id> - reject a file transfer request from a user\n\
             /send <nick> <file> - send a file to a user\n\
             /topic <optional new topic> - prints the current topic, or changes the topic\n\
             /transfers - shows a list of all file transfers and their status\n\
             /users - show the user list\n\
             /whois <nick> - show information about a user\n\
             //<text> - send the text as a normal message, with a single slash",
            app = APP_NAME
        ));
    }

    fn cmd_whois(&self, args: &str) {
        let Some(nick) = args.split_whitespace().next() else {
            self.show("/whois - missing argument <nick>");
            return;
        };

        let Some(peer) = self.controller.registry().find_by_nick(nick) else {
            self.show(&format!("/whois - no such user '{}'", nick));
            return;
        };

        let mut info = if peer.away {
            format!("/whois - {} (Away):", peer.nick)
        } else {
            format!("/whois - {}:", peer.nick)
        };

        info.push_str(&format!("\nIP address: {}", peer.ip_address));
        if let Some(host_name) = &peer.host_name {
            info.push_str(&format!("\nHost name: {}", host_name));
        }
        info.push_str(&format!("\nClient: {}", peer.client));
        if peer.tcp_enabled {
            info.push_str(" TCP");
        }
        info.push_str(&format!("\nOperating System: {}", peer.operating_system));

        let now = chrono::Utc::now().timestamp_millis();
        info.push_str(&format!(
            "\nOnline: {}",
            how_long_from_now(peer.logon_time, now)
        ));
        if peer.away {
            info.push_str(&format!("\nAway message: {}", peer.away_message));
        }

        self.show(&info);
    }

    fn cmd_send(&self, args: &str) {
        let words: Vec<&str> = args.split_whitespace().collect();
        if words.len() < 2 {
            self.show("/send - missing arguments <nick> <file>");
            return;
        }

        let nick = words[0];
        let Some(peer) = self.controller.registry().find_by_nick(nick) else {
            self.show(&format!("/send - no such user '{}'", nick));
            return;
        };
        if peer.is_self {
            self.show("/send - no point in doing that!");
            return;
        }

        let file = words[1..].join(" ");
        let path = Path::new(&file);
        if !path.is_file() {
            self.show(&format!("/send - no such file '{}'", file));
            return;
        }

        match self.controller.send_file(&peer, path) {
            Ok(transfer) => self.show(&format!(
                "Trying to send the file {} (#{}) [{}] to {}",
                transfer.file_name,
                transfer.id,
                byte_to_string(transfer.file_size),
                peer.nick
            )),
            Err(e) => self.show(&e.to_string()),
        }
    }

    /// Shared argument checks of `/receive`, `/reject` and `/cancel`.
    fn transfer_args<'a>(&self, command: &str, args: &'a str) -> Option<(Peer, &'a str, u32)> {
        let words: Vec<&str> = args.split_whitespace().collect();
        if words.is_empty() {
            self.show(&format!("/{} - missing arguments <nick> <id>", command));
            return None;
        }
        if words.len() != 2 {
            self.show(&format!(
                "/{} - wrong number of arguments: <nick> <id>",
                command
            ));
            return None;
        }

        let nick = words[0];
        let Some(peer) = self.controller.registry().find_by_nick(nick) else {
            self.show(&format!("/{} - no such user '{}'", command, nick));
            return None;
        };
        if peer.is_self {
            self.show(&format!("/{} - no point in doing that!", command));
            return None;
        }

        let Ok(id) = words[1].parse::<u32>() else {
            self.show(&format!(
                "/{} - invalid file id argument: '{}'",
                command, words[1]
            ));
            return None;
        };

        Some((peer, nick, id))
    }

    /// A file offered to us that has not been answered yet.
    fn pending_offer(&self, command: &str, peer: &Peer, nick: &str, id: u32) -> Option<Transfer> {
        let Some(transfer) = self
            .controller
            .transfers()
            .find_receiver_by_id(peer.code, id)
        else {
            self.show(&format!(
                "/{} - no file with id {} offered by {}",
                command, id, nick
            ));
            return None;
        };

        if transfer.is_accepted() {
            self.show(&format!(
                "/{} - already receiving '{}' from {}",
                command, transfer.file_name, nick
            ));
            return None;
        }

        Some(transfer)
    }

    fn cmd_receive(&self, args: &str) {
        let Some((peer, nick, id)) = self.transfer_args("receive", args) else {
            return;
        };
        let Some(mut transfer) = self.pending_offer("receive", &peer, nick, id) else {
            return;
        };

        if transfer.path.exists() {
            let renamed = incremented_path(&transfer.path);
            self.show(&format!(
                "/receive - file '{}' already exists - renaming to '{}'",
                file_name_of(&transfer.path),
                file_name_of(&renamed)
            ));

            if let Some(updated) = self
                .controller
                .transfers()
                .update(transfer.id, |t| t.path = renamed)
            {
                transfer = updated;
            }
        }

        if let Err(e) = self.controller.accept_transfer(&transfer) {
            self.show(&e.to_string());
        }
    }

    fn cmd_reject(&self, args: &str) {
        let Some((peer, nick, id)) = self.transfer_args("reject", args) else {
            return;
        };
        let Some(transfer) = self.pending_offer("reject", &peer, nick, id) else {
            return;
        };

        self.show(&format!(
            "You declined to receive {} from {}",
            transfer.file_name, transfer.peer_nick
        ));
        self.controller.reject_transfer(&transfer);
    }

    fn cmd_cancel(&self, args: &str) {
        let Some((peer, nick, id)) = self.transfer_args("cancel", args) else {
            return;
        };

        let Some(transfer) = self.controller.transfers().find(peer.code, id) else {
            self.show(&format!(
                "/cancel - no file transfer with id {} going on with {}",
                id, nick
            ));
            return;
        };

        if transfer.direction == Direction::Receive && !transfer.is_accepted() {
            self.show(&format!(
                "/cancel - transfer of '{}' from {} has not started yet",
                transfer.file_name, nick
            ));
            return;
        }

        self.cancel_file_transfer(&transfer);
    }

    /// Stop a transfer we are part of.
    pub fn cancel_file_transfer(&self, transfer: &Transfer) {
        self.controller.cancel_transfer(transfer);

        match transfer.direction {
            Direction::Send => self.show(&format!(
                "You cancelled sending of {} to {}",
                transfer.file_name, transfer.peer_nick
            )),
            Direction::Receive => self.show(&format!(
                "You cancelled receiving of {} from {}",
                transfer.file_name, transfer.peer_nick
            )),
        }
    }

    fn cmd_msg(&self, args: &str) {
        let words: Vec<&str> = args.split_whitespace().collect();
        if words.len() < 2 {
            self.show("/msg - missing arguments <nick> <msg>");
            return;
        }

        let nick = words[0];
        let Some(peer) = self.controller.registry().find_by_nick(nick) else {
            self.show(&format!("/msg - no such user '{}'", nick));
            return;
        };
        if peer.is_self {
            self.show("/msg - no point in doing that!");
            return;
        }
        if !self.controller.settings().is_private_chat_enabled() {
            self.show("/msg - can't send private chat message when private chat is disabled");
            return;
        }
        if peer.private_chat_port == 0 {
            self.show(&format!(
                "/msg - {} can't receive private chat messages",
                peer.nick
            ));
            return;
        }

        let text = words[1..].join(" ");
        match self.controller.send_private_message(&text, &peer) {
            Ok(()) => self
                .controller
                .message_controller()
                .show_private_own_message(&peer, &text),
            Err(e) => self.show(&e.to_string()),
        }
    }

    fn cmd_nick(&self, args: &str) {
        let Some(nick) = args.split_whitespace().next() else {
            self.show("/nick - missing argument <nick>");
            return;
        };

        if nick == self.controller.me().nick {
            self.show(&format!("/nick - you are already called '{}'", nick));
            return;
        }
        if self.controller.registry().is_nick_in_use(nick) {
            self.show(&format!("/nick - '{}' is in use by someone else", nick));
            return;
        }
        if !is_valid_nick(nick) {
            self.show(&format!(
                "/nick - '{}' is not a valid nick name. (1-10 letters)",
                nick
            ));
            return;
        }

        match self.controller.change_my_nick(nick) {
            Ok(()) => {
                self.show(&format!("You changed nick to {}", nick));
                self.controller.ui().show_topic(&self.controller.topic());
            }
            Err(e) => self.show(&e.to_string()),
        }
    }

    fn cmd_users(&self) {
        let nicks: Vec<String> = self
            .controller
            .registry()
            .snapshot()
            .into_iter()
            .map(|peer| peer.nick)
            .collect();

        self.show(&format!("Users: {}", nicks.join(", ")));
    }

    fn cmd_transfers(&self) {
        let transfers = self.controller.transfers();
        let senders = transfers.senders();
        let receivers = transfers.receivers();

        let mut info = String::new();
        if !senders.is_empty() {
            info.push_str("\n- Sending:");
            for transfer in &senders {
                info.push_str(&transfer_line(transfer, "to"));
            }
        }
        if !receivers.is_empty() {
            info.push_str("\n- Receiving:");
            for transfer in &receivers {
                info.push_str(&transfer_line(transfer, "from"));
            }
        }

        if info.is_empty() {
            self.show("File transfers: no active file transfers");
        } else {
            self.show(&format!("File transfers:{}", info));
        }
    }

    /// `//text` is sent as `/text`.
    fn cmd_slash(&self, text: &str) {
        let result = self.controller.send_chat_message(text);
        match result {
            Ok(()) => self.controller.message_controller().show_own_message(text),
            Err(e) => self.show(&e.to_string()),
        }
    }
}

fn transfer_line(transfer: &Transfer, preposition: &str) -> String {
    format!(
        "\n  #{} {} [{}] ({}%, {}/s) {} {}",
        transfer.id,
        transfer.file_name,
        byte_to_string(transfer.file_size),
        transfer.percent(),
        byte_to_string(transfer.speed),
        preposition,
        transfer.peer_nick
    )
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
