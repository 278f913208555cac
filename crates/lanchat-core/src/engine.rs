//! Event loop tying the transport, the dispatcher and the background tasks
//! together.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use lanchat_net::TransportNotification;
use lanchat_shared::constants::{HEARTBEAT_INTERVAL_SECS, PEER_TIMEOUT_SECS};
use lanchat_shared::protocol::WireMessage;

use crate::commands::CommandParser;
use crate::controller::{Collaborators, Controller};
use crate::dispatcher::{MessageDispatcher, Origin};
use crate::identify::IdentificationGate;
use crate::liveness::LivenessMonitor;
use crate::settings::Settings;
use crate::transfers::TransferUpdate;

/// A running chat session.
pub struct ChatEngine {
    controller: Arc<Controller>,
    dispatcher: Arc<MessageDispatcher>,
    gate: IdentificationGate,
    parser: CommandParser,
    transfer_updates: Mutex<Option<mpsc::UnboundedReceiver<TransferUpdate>>>,
    heartbeat_interval: Duration,
    peer_timeout: Duration,
}

impl ChatEngine {
    pub fn new(settings: Arc<Settings>, collaborators: Collaborators) -> Self {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let controller = Arc::new(Controller::new(settings, collaborators, updates_tx));
        let dispatcher = Arc::new(MessageDispatcher::new(controller.clone()));

        Self {
            gate: IdentificationGate::new(controller.clone(), dispatcher.clone()),
            parser: CommandParser::new(controller.clone()),
            controller,
            dispatcher,
            transfer_updates: Mutex::new(Some(updates_rx)),
            heartbeat_interval: Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
            peer_timeout: Duration::from_secs(PEER_TIMEOUT_SECS),
        }
    }

    /// How long a message from an unknown sender waits for it to identify.
    pub fn with_identify_wait(mut self, wait: Duration) -> Self {
        self.gate = self.gate.with_wait(wait);
        self
    }

    pub fn with_liveness_timing(mut self, interval: Duration, timeout: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.peer_timeout = timeout;
        self
    }

    pub fn controller(&self) -> &Arc<Controller> {
        &self.controller
    }

    pub fn dispatcher(&self) -> &Arc<MessageDispatcher> {
        &self.dispatcher
    }

    pub fn parser(&self) -> &CommandParser {
        &self.parser
    }

    /// A liveness monitor with the engine's timing, for driving ticks by hand.
    pub fn liveness(&self) -> LivenessMonitor {
        LivenessMonitor::new(self.controller.clone())
            .with_timing(self.heartbeat_interval, self.peer_timeout)
    }

    /// Show the welcome text and start the background tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        self.controller.show_welcome();

        let mut tasks = vec![self.liveness().spawn(), self.spawn_settings_watcher()];
        if let Some(task) = self.spawn_transfer_updates() {
            tasks.push(task);
        }

        info!(code = %self.controller.me_code(), nick = %self.controller.me().nick, "Chat engine started");
        tasks
    }

    fn spawn_transfer_updates(&self) -> Option<JoinHandle<()>> {
        let mut updates = self
            .transfer_updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        let controller = self.controller.clone();
        let mut shutdown = controller.shutdown_signal();

        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = updates.recv() => match update {
                        Some(update) => controller.apply_transfer_update(update),
                        None => break,
                    },
                    _ = shutdown.wait_for(|stopped| *stopped) => break,
                }
            }
            debug!("Transfer update task stopped");
        }))
    }

    /// Re-announce our private chat port when private chat is toggled.
    fn spawn_settings_watcher(&self) -> JoinHandle<()> {
        let controller = self.controller.clone();
        let mut settings = controller.settings().subscribe();
        let mut shutdown = controller.shutdown_signal();

        tokio::spawn(async move {
            let mut private_chat = settings.borrow_and_update().private_chat_enabled;

            loop {
                tokio::select! {
                    changed = settings.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let enabled = settings.borrow_and_update().private_chat_enabled;
                        if enabled != private_chat {
                            private_chat = enabled;
                            controller.refresh_private_chat();
                        }
                    }
                    _ = shutdown.wait_for(|stopped| *stopped) => break,
                }
            }
            debug!("Settings watcher stopped");
        })
    }

    /// Feed transport notifications to the engine until the channel closes
    /// or shutdown begins.
    pub async fn run(&self, mut notifications: mpsc::Receiver<TransportNotification>) {
        let mut shutdown = self.controller.shutdown_signal();

        loop {
            tokio::select! {
                notification = notifications.recv() => match notification {
                    Some(notification) => self.handle_notification(notification),
                    None => {
                        debug!("Transport channel closed");
                        break;
                    }
                },
                _ = shutdown.wait_for(|stopped| *stopped) => break,
            }
        }
    }

    pub fn handle_notification(&self, notification: TransportNotification) {
        match notification {
            TransportNotification::LineReceived { line, ip_address } => {
                self.on_line_received(&line, &ip_address)
            }
            TransportNotification::PrivateLineReceived { line, ip_address } => {
                self.on_private_line_received(&line, &ip_address)
            }
            TransportNotification::NetworkUp => self.controller.network_came_up(),
            TransportNotification::NetworkDown => self.controller.network_went_down(),
        }
    }

    /// A line from the shared chat.
    pub fn on_line_received(&self, line: &str, ip_address: &str) {
        self.on_line(line, ip_address, Origin::Shared);
    }

    /// A line from our private chat socket.
    pub fn on_private_line_received(&self, line: &str, ip_address: &str) {
        self.on_line(line, ip_address, Origin::Private);
    }

    fn on_line(&self, line: &str, ip_address: &str, origin: Origin) {
        let message = match WireMessage::decode(line) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, ip = %ip_address, "Dropping malformed message");
                return;
            }
        };

        if self.dispatcher.handle_own_message(&message, ip_address) {
            return;
        }

        if !self.controller.is_logged_on() {
            debug!(kind = %message.message_type(), "Not logged on, ignoring message");
            return;
        }

        self.gate.route(message, ip_address.to_string(), origin);
    }

    /// Run a line typed by the user: a command, or a chat message.
    pub fn execute(&self, input: &str) {
        if input.starts_with('/') {
            self.parser.parse(input);
            return;
        }

        let msg = self.controller.message_controller();
        match self.controller.send_chat_message(input) {
            Ok(()) => msg.show_own_message(input),
            Err(e) => msg.show_system_message(&e.to_string()),
        }
    }

    pub fn update_me_writing(&self, writing: bool) {
        self.controller.update_me_writing(writing);
    }

    /// Log off and stop every background task.
    pub fn shutdown(&self) {
        if self.controller.is_logged_on() {
            self.controller.log_off(true);
        }
        self.controller.shutdown();
        info!("Chat engine stopped");
    }
}
