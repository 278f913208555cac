//! Actions on the chat session.
//!
//! The controller owns the shared state (registry, chat state, transfers and
//! waiting list) and is the one place where user actions are checked against
//! it. Inbound messages, the liveness monitor and user commands all go
//! through here.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use lanchat_net::MessageTransport;
use lanchat_shared::constants::{APP_NAME, APP_VERSION, LOGON_GRACE_MILLIS, MESSAGE_MAX_BYTES};
use lanchat_shared::nick::fits_in_message;
use lanchat_shared::types::{PeerAddress, PeerCode};

use crate::chat_state::{ChatState, Topic};
use crate::error::CommandError;
use crate::format::today;
use crate::identify::WaitingList;
use crate::messages::NetworkMessages;
use crate::peer::Peer;
use crate::registry::PeerRegistry;
use crate::settings::Settings;
use crate::transfers::{
    file_hash, Direction, FileTransferPump, Transfer, TransferList, TransferStatus,
    TransferUpdate, TransferUpdates,
};
use crate::ui::{ChatWindowSink, MessageController, UserInterfaceSink};

/// The outside world the controller talks to.
pub struct Collaborators {
    pub transport: Arc<dyn MessageTransport>,
    pub chat: Arc<dyn ChatWindowSink>,
    pub ui: Arc<dyn UserInterfaceSink>,
    pub pump: Arc<dyn FileTransferPump>,
}

pub struct Controller {
    settings: Arc<Settings>,
    registry: Arc<PeerRegistry>,
    chat_state: ChatState,
    transfers: TransferList,
    waiting: WaitingList,
    messages: NetworkMessages,
    msg: MessageController,
    ui: Arc<dyn UserInterfaceSink>,
    pump: Arc<dyn FileTransferPump>,
    transfer_updates: TransferUpdates,
    network_up: AtomicBool,
    shutdown: watch::Sender<bool>,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl Controller {
    /// Create a controller with ourselves as the only registered peer.
    ///
    /// Progress from the file transfer pump is reported on
    /// `transfer_updates` and should be fed back through
    /// [`apply_transfer_update`](Self::apply_transfer_update).
    pub fn new(
        settings: Arc<Settings>,
        collaborators: Collaborators,
        transfer_updates: TransferUpdates,
    ) -> Self {
        let registry = Arc::new(PeerRegistry::new());
        registry.add(Self::create_me(&settings, collaborators.transport.as_ref()));

        let messages = NetworkMessages::new(
            collaborators.transport,
            settings.clone(),
            registry.clone(),
        );
        let msg = MessageController::new(collaborators.chat, settings.clone());
        let (shutdown, _) = watch::channel(false);

        Self {
            settings,
            registry,
            chat_state: ChatState::new(),
            transfers: TransferList::new(),
            waiting: WaitingList::new(),
            messages,
            msg,
            ui: collaborators.ui,
            pump: collaborators.pump,
            transfer_updates,
            network_up: AtomicBool::new(false),
            shutdown,
        }
    }

    fn create_me(settings: &Settings, transport: &dyn MessageTransport) -> Peer {
        let mut me = Peer::new(settings.nick(), settings.code());
        me.is_self = true;
        me.client = settings.client();
        me.operating_system = std::env::consts::OS.to_string();
        me.host_name = settings.host_name();
        me.private_chat_port = Self::own_private_port(settings, transport);
        me
    }

    fn own_private_port(settings: &Settings, transport: &dyn MessageTransport) -> u16 {
        if settings.is_private_chat_enabled() {
            transport.private_port().unwrap_or(0)
        } else {
            0
        }
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    pub fn chat_state(&self) -> &ChatState {
        &self.chat_state
    }

    pub fn transfers(&self) -> &TransferList {
        &self.transfers
    }

    pub fn waiting_list(&self) -> &WaitingList {
        &self.waiting
    }

    pub fn messages(&self) -> &NetworkMessages {
        &self.messages
    }

    pub fn message_controller(&self) -> &MessageController {
        &self.msg
    }

    pub fn ui(&self) -> &Arc<dyn UserInterfaceSink> {
        &self.ui
    }

    pub fn pump(&self) -> &Arc<dyn FileTransferPump> {
        &self.pump
    }

    pub fn transfer_updates(&self) -> TransferUpdates {
        self.transfer_updates.clone()
    }

    /// Our own registry entry.
    pub fn me(&self) -> Peer {
        self.registry.me().unwrap_or_else(|| {
            let mut me = Peer::new(self.settings.nick(), self.settings.code());
            me.is_self = true;
            me
        })
    }

    pub fn me_code(&self) -> PeerCode {
        self.settings.code()
    }

    pub fn topic(&self) -> Topic {
        self.chat_state.topic()
    }

    pub fn is_logged_on(&self) -> bool {
        self.chat_state.is_logged_on()
    }

    pub fn is_network_up(&self) -> bool {
        self.network_up.load(Ordering::SeqCst)
    }

    /// Logged on and the network is up.
    pub fn is_connected(&self) -> bool {
        self.is_network_up() && self.is_logged_on()
    }

    /// Receiver that flips to `true` when shutdown begins.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn show_welcome(&self) {
        self.msg
            .show_system_message(&format!("Welcome to {} v{}!", APP_NAME, APP_VERSION));
        self.msg
            .show_system_message(&format!("Today is {}", today()));
    }

    // ---------------------------------------------------------------------
    // Chat

    pub fn send_chat_message(&self, text: &str) -> Result<(), CommandError> {
        if !self.is_connected() {
            return Err(CommandError::new(
                "You can not send a chat message without being connected",
            ));
        }
        if self.me().away {
            return Err(CommandError::new(
                "You can not send a chat message while away",
            ));
        }
        if text.trim().is_empty() {
            return Err(CommandError::new("You can not send an empty chat message"));
        }
        if !fits_in_message(text) {
            return Err(CommandError(format!(
                "You can not send a chat message with more than {} bytes",
                MESSAGE_MAX_BYTES
            )));
        }

        self.messages.send_chat_message(text)
    }

    pub fn send_private_message(&self, text: &str, peer: &Peer) -> Result<(), CommandError> {
        if !self.is_connected() {
            return Err(CommandError::new(
                "You can not send a private chat message without being connected",
            ));
        }
        if self.me().away {
            return Err(CommandError::new(
                "You can not send a private chat message while away",
            ));
        }
        if text.trim().is_empty() {
            return Err(CommandError::new(
                "You can not send an empty private chat message",
            ));
        }
        if !fits_in_message(text) {
            return Err(CommandError(format!(
                "You can not send a private chat message with more than {} bytes",
                MESSAGE_MAX_BYTES
            )));
        }
        if peer.private_chat_port == 0 {
            return Err(CommandError::new(
                "You can not send a private chat message to a user with no available port number",
            ));
        }
        if peer.away {
            return Err(CommandError::new(
                "You can not send a private chat message to a user that is away",
            ));
        }
        if !peer.online {
            return Err(CommandError::new(
                "You can not send a private chat message to a user that is offline",
            ));
        }
        if !self.settings.is_private_chat_enabled() {
            return Err(CommandError::new(
                "You can not send a private chat message when private chat is disabled",
            ));
        }

        self.messages.send_private_message(text, peer)
    }

    /// Set a new topic, or remove it with an empty text.
    pub fn change_topic(&self, text: &str) -> Result<(), CommandError> {
        if !self.is_connected() {
            return Err(CommandError::new(
                "You can not change the topic without being connected",
            ));
        }
        if self.me().away {
            return Err(CommandError::new(
                "You can not change the topic while away",
            ));
        }
        if !fits_in_message(text) {
            return Err(CommandError(format!(
                "You can not set a topic with more than {} bytes",
                MESSAGE_MAX_BYTES
            )));
        }

        let topic = Topic::new(text, self.settings.nick(), now_millis());
        self.messages.send_topic(&topic);
        self.chat_state.set_topic(topic);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Peer state

    /// Change the away state of any peer. For ourselves the change is
    /// checked and announced first.
    pub fn change_away_status(
        &self,
        code: PeerCode,
        away: bool,
        away_message: &str,
    ) -> Result<(), CommandError> {
        if code == self.me_code() {
            if !self.is_logged_on() {
                return Err(CommandError::new(
                    "You can not change away mode without being connected",
                ));
            }
            if away && !fits_in_message(away_message) {
                return Err(CommandError(format!(
                    "You can not set an away message with more than {} bytes",
                    MESSAGE_MAX_BYTES
                )));
            }

            if away {
                self.messages.send_away(away_message);
            } else {
                self.messages.send_back();
            }
        }

        let away_message = if away { away_message } else { "" };
        self.registry
            .update(code, |peer| peer.set_away(away_message));
        Ok(())
    }

    pub fn go_away(&self, away_message: &str) -> Result<(), CommandError> {
        let away_message = away_message.trim();
        if away_message.is_empty() {
            return Err(CommandError::new(
                "You can not go away without an away message",
            ));
        }

        self.change_away_status(self.me_code(), true, away_message)?;
        self.ui.show_topic(&self.topic());
        self.msg
            .show_system_message(&format!("You went away: {}", away_message));
        Ok(())
    }

    pub fn come_back(&self) -> Result<(), CommandError> {
        self.change_away_status(self.me_code(), false, "")?;
        self.ui.show_topic(&self.topic());
        self.msg.show_system_message("You came back");
        Ok(())
    }

    /// Announce and apply a new nick for ourselves.
    pub fn change_my_nick(&self, nick: &str) -> Result<(), CommandError> {
        if self.me().away {
            return Err(CommandError::new("You can not change nick while away"));
        }

        self.messages.send_nick(nick);
        self.change_nick(self.me_code(), nick);
        Ok(())
    }

    /// Rename a peer locally. Our own nick is saved in the settings too.
    pub fn change_nick(&self, code: PeerCode, nick: &str) {
        if self
            .registry
            .update(code, |peer| peer.nick = nick.to_string())
            .is_none()
        {
            debug!(code = %code, nick = %nick, "Nick change for unknown peer");
            return;
        }

        if code == self.me_code() {
            if let Err(e) = self.settings.set_nick(nick) {
                warn!(nick = %nick, error = %e, "Failed to store new nick");
            }
        }
        self.transfers.rename_peer(code, nick);
    }

    pub fn change_writing(&self, code: PeerCode, writing: bool) {
        self.registry.update(code, |peer| peer.writing = writing);
    }

    /// Tell the others whether we are writing, only when it changes.
    pub fn update_me_writing(&self, writing: bool) {
        if self.chat_state.swap_wrote(writing) == writing {
            return;
        }

        self.change_writing(self.me_code(), writing);
        if !self.is_connected() {
            return;
        }

        if writing {
            self.messages.send_writing();
        } else {
            self.messages.send_stopped_writing();
        }
    }

    /// Remove a peer that left or timed out, canceling its transfers.
    pub fn remove_peer(&self, code: PeerCode, reason: &str) -> Option<Peer> {
        self.cancel_transfers_with(code);

        let mut peer = self.registry.remove(code)?;
        peer.online = false;

        self.msg.show_system_message(reason);
        if peer.private_chat_open {
            self.msg.show_private_system_message(&peer, reason);
        }
        Some(peer)
    }

    fn remove_all_peers(&self) {
        for peer in self.registry.snapshot() {
            if peer.is_self {
                continue;
            }

            self.cancel_transfers_with(peer.code);
            if let Some(mut peer) = self.registry.remove(peer.code) {
                peer.online = false;
                if peer.private_chat_open {
                    self.msg.show_private_system_message(&peer, "You logged off");
                }
            }
        }
    }

    /// Ask everyone to expose themselves if a peer is left with its code as
    /// nick, so the real nick can be learned again.
    pub fn update_after_timeout(&self) {
        if self.registry.has_timed_out_nicks() {
            debug!("Peers with placeholder nicks remain, sending expose");
            self.messages.send_expose();
        }
    }

    /// Announce the private chat port again after it was toggled.
    pub fn refresh_private_chat(&self) {
        let port = Self::own_private_port(&self.settings, self.messages.transport().as_ref());
        self.registry
            .update(self.me_code(), |me| me.private_chat_port = port);

        info!(port, "Private chat port changed");
        if self.is_connected() {
            self.messages.send_client();
        }
    }

    // ---------------------------------------------------------------------
    // Session

    /// Our own LOGON came back from the network.
    pub fn me_log_on(&self, ip_address: &str) {
        self.chat_state.set_logged_on(true);

        let me = self.registry.update(self.me_code(), |me| {
            me.ip_address = ip_address.to_string();
            me.last_heartbeat = Instant::now();
        });
        let host = me
            .map(|me| me.host_info())
            .unwrap_or_else(|| ip_address.to_string());

        self.msg.show_system_message(&format!(
            "You logged on as {} from {}",
            self.settings.nick(),
            host
        ));
        self.ui.show_topic(&self.topic());
    }

    /// Our own IDLE came back from the network.
    pub fn me_idle(&self, ip_address: &str) {
        let me = self.me();
        if me.ip_address != ip_address {
            self.msg.show_system_message(&format!(
                "You changed ip from {} to {}",
                me.ip_address, ip_address
            ));
        }

        self.registry.update(self.me_code(), |me| {
            me.ip_address = ip_address.to_string();
            me.last_heartbeat = Instant::now();
        });
    }

    /// Announce ourselves and ask for everyone else and the topic.
    pub fn send_logon(&self) {
        self.registry
            .update(self.me_code(), |me| me.logon_time = now_millis());

        self.messages.send_logon();
        self.messages.send_client();
        self.messages.send_expose();
        self.messages.send_get_topic();
    }

    /// The transport reports connectivity.
    ///
    /// Must be called from within a tokio runtime.
    pub fn network_came_up(self: &Arc<Self>) {
        self.network_up.store(true, Ordering::SeqCst);

        if !self.is_logged_on() {
            self.spawn_delayed_logon();
            self.send_logon();
            return;
        }

        info!("Network is back");
        self.ui.show_topic(&self.topic());
        self.msg
            .show_system_message("You are connected to the network again");

        self.messages.send_topic(&self.topic());
        self.messages.send_exposing();
        self.messages.send_get_topic();
        self.messages.send_expose();
        self.messages.send_idle();
    }

    /// Mark logon as completed after the grace period, if we are still
    /// connected by then.
    fn spawn_delayed_logon(self: &Arc<Self>) {
        let controller = self.clone();
        let mut shutdown = self.shutdown_signal();

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(LOGON_GRACE_MILLIS)) => {
                    if controller.is_network_up() {
                        controller.chat_state.set_logon_completed(true);
                        debug!("Logon completed");
                    }
                }
                _ = shutdown.wait_for(|stopped| *stopped) => {}
            }
        });
    }

    pub fn network_went_down(&self) {
        self.network_up.store(false, Ordering::SeqCst);
        self.ui.show_topic(&self.topic());

        if self.is_logged_on() {
            warn!("Lost contact with the network");
            self.msg
                .show_system_message("You lost contact with the network");
        } else {
            self.msg.show_system_message("You logged off");
        }
    }

    /// Leave the chat. All session state is reset.
    pub fn log_off(&self, remove_peers: bool) {
        self.messages.send_logoff();

        self.chat_state.reset();
        self.waiting.clear();
        if remove_peers {
            self.remove_all_peers();
        }

        self.registry.update(self.me_code(), |me| {
            me.set_away("");
            me.writing = false;
            me.new_private_message = false;
        });
        info!("Logged off");
    }

    /// Stop every background task started by the engine.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    // ---------------------------------------------------------------------
    // File transfers

    /// Offer a file to a peer.
    pub fn send_file(&self, peer: &Peer, path: &Path) -> Result<Transfer, CommandError> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        if peer.is_self {
            return Err(CommandError::new("You can not send a file to yourself"));
        }
        if !self.is_connected() {
            return Err(CommandError::new(
                "You can not send a file without being connected",
            ));
        }
        if self.me().away {
            return Err(CommandError::new("You can not send a file while away"));
        }
        if peer.away {
            return Err(CommandError::new(
                "You can not send a file to a user that is away",
            ));
        }
        if !fits_in_message(&file_name) {
            return Err(CommandError(format!(
                "You can not send a file with a name with more than {} bytes",
                MESSAGE_MAX_BYTES
            )));
        }

        let size = std::fs::metadata(path)
            .map(|metadata| metadata.len())
            .map_err(|e| {
                warn!(path = %path.display(), error = %e, "Failed to read file to send");
                CommandError(format!("Failed to send file to {}: {}", peer.nick, file_name))
            })?;

        let transfer = self.transfers.add_sender(
            peer.code,
            &peer.nick,
            path.to_path_buf(),
            size,
            file_hash(path),
        );

        if let Err(e) = self.messages.send_file(peer, &transfer) {
            self.transfers.remove(transfer.id);
            return Err(e);
        }

        self.ui.show_transfer(&transfer);
        Ok(transfer)
    }

    /// Accept a file offered to us and tell the sender where to connect.
    pub fn accept_transfer(&self, transfer: &Transfer) -> Result<(), CommandError> {
        let failed = || {
            CommandError(format!(
                "Failed to accept file transfer from {}: {}",
                transfer.peer_nick, transfer.file_name
            ))
        };

        let port = self
            .pump
            .prepare_receive(transfer, self.transfer_updates())
            .map_err(|e| {
                warn!(id = transfer.id, error = %e, "Failed to prepare file reception");
                failed()
            })?;

        let accepted = self
            .transfers
            .update(transfer.id, |t| t.status = TransferStatus::Transferring)
            .ok_or_else(failed)?;

        if let Err(e) = self.messages.send_file_accept(&accepted, port) {
            self.pump.cancel(&accepted);
            self.transfers.remove(accepted.id);
            return Err(e);
        }

        self.ui.show_transfer(&accepted);
        Ok(())
    }

    /// Decline a file offered to us.
    pub fn reject_transfer(&self, transfer: &Transfer) {
        self.messages
            .send_file_abort(transfer.peer, transfer.file_hash, &transfer.file_name);
        self.transfers.remove(transfer.id);
        self.show_transfer_status(transfer, TransferStatus::Canceled);
    }

    /// Stop a transfer in either direction and tell the peer.
    pub fn cancel_transfer(&self, transfer: &Transfer) {
        if transfer.is_accepted() {
            self.pump.cancel(transfer);
        }
        self.transfers.remove(transfer.id);
        self.messages
            .send_file_abort(transfer.peer, transfer.file_hash, &transfer.file_name);
        self.show_transfer_status(transfer, TransferStatus::Canceled);
    }

    /// Drop every transfer with a peer that went away.
    pub fn cancel_transfers_with(&self, code: PeerCode) {
        for transfer in self.transfers.remove_all_for(code) {
            debug!(id = transfer.id, peer = %code, "Canceling file transfer");
            if transfer.is_accepted() {
                self.pump.cancel(&transfer);
            }
            self.show_transfer_status(&transfer, TransferStatus::Canceled);
        }
    }

    /// The sender of a file we offered agreed to receive it.
    pub fn start_sending(&self, transfer: &Transfer, target: PeerAddress) {
        let Some(sending) = self
            .transfers
            .update(transfer.id, |t| t.status = TransferStatus::Transferring)
        else {
            return;
        };

        self.pump
            .start_send(&sending, target, self.transfer_updates());
        self.ui.show_transfer(&sending);
    }

    /// Apply progress reported by the pump. Updates for transfers that are
    /// gone (canceled meanwhile) are ignored.
    pub fn apply_transfer_update(&self, update: TransferUpdate) {
        match update {
            TransferUpdate::Progress {
                id,
                transferred,
                speed,
            } => {
                if let Some(transfer) = self.transfers.update(id, |t| {
                    t.transferred = transferred;
                    t.speed = speed;
                }) {
                    self.ui.show_transfer(&transfer);
                }
            }
            TransferUpdate::Completed { id } => {
                let Some(transfer) = self.transfers.remove(id) else {
                    debug!(id, "Completion for unknown transfer");
                    return;
                };

                let text = match transfer.direction {
                    Direction::Send => format!(
                        "{} successfully sent to {}",
                        transfer.file_name, transfer.peer_nick
                    ),
                    Direction::Receive => format!(
                        "Successfully received {} from {}, and saved as {}",
                        transfer.file_name,
                        transfer.peer_nick,
                        transfer
                            .path
                            .file_name()
                            .map(|name| name.to_string_lossy().into_owned())
                            .unwrap_or_default()
                    ),
                };
                self.msg.show_system_message(&text);
                self.show_transfer_status(&transfer, TransferStatus::Completed);
            }
            TransferUpdate::Failed { id } => {
                let Some(transfer) = self.transfers.remove(id) else {
                    debug!(id, "Failure for unknown transfer");
                    return;
                };

                let text = match transfer.direction {
                    Direction::Send => format!(
                        "Failed to send {} to {}",
                        transfer.file_name, transfer.peer_nick
                    ),
                    Direction::Receive => format!(
                        "Failed to receive {} from {}",
                        transfer.file_name, transfer.peer_nick
                    ),
                };
                self.msg.show_system_message(&text);
                self.show_transfer_status(&transfer, TransferStatus::Failed);
            }
        }
    }

    fn show_transfer_status(&self, transfer: &Transfer, status: TransferStatus) {
        let mut transfer = transfer.clone();
        transfer.status = status;
        self.ui.show_transfer(&transfer);
    }
}
