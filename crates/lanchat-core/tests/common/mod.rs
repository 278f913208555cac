#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lanchat_core::{
    ChatEngine, ChatWindowSink, Collaborators, FileTransferPump, Peer, Settings, SettingsData,
    Topic, Transfer, TransferUpdates, UserInterfaceSink,
};
use lanchat_net::MessageTransport;
use lanchat_shared::{MessageType, PeerAddress, PeerCode, WireMessage};

pub const ME: PeerCode = PeerCode(1000);
pub const MY_IP: &str = "10.0.0.1";

#[derive(Default)]
pub struct RecordingTransport {
    broadcasts: Mutex<Vec<String>>,
    unicasts: Mutex<Vec<(String, PeerAddress)>>,
    pub fail: AtomicBool,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<WireMessage> {
        self.broadcasts
            .lock()
            .unwrap()
            .iter()
            .map(|line| WireMessage::decode(line).unwrap())
            .collect()
    }

    pub fn count(&self, kind: MessageType) -> usize {
        self.sent()
            .iter()
            .filter(|m| m.message_type() == kind)
            .count()
    }

    pub fn unicasts(&self) -> Vec<(String, PeerAddress)> {
        self.unicasts.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.broadcasts.lock().unwrap().clear();
        self.unicasts.lock().unwrap().clear();
    }
}

impl MessageTransport for RecordingTransport {
    fn broadcast(&self, line: &str) -> bool {
        if self.fail.load(Ordering::SeqCst) {
            return false;
        }
        self.broadcasts.lock().unwrap().push(line.to_string());
        true
    }

    fn unicast(&self, line: &str, target: &PeerAddress) -> bool {
        if self.fail.load(Ordering::SeqCst) {
            return false;
        }
        self.unicasts
            .lock()
            .unwrap()
            .push((line.to_string(), target.clone()));
        true
    }

    fn private_port(&self) -> Option<u16> {
        Some(40656)
    }
}

#[derive(Default)]
pub struct RecordingChat {
    lines: Mutex<Vec<String>>,
    private_lines: Mutex<Vec<(PeerCode, String)>>,
}

impl RecordingChat {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    /// System messages without the timestamp prefix.
    pub fn system_messages(&self) -> Vec<String> {
        self.lines()
            .iter()
            .filter_map(|line| line.split_once(" *** ").map(|(_, m)| m.to_string()))
            .collect()
    }

    pub fn has_system_message(&self, message: &str) -> bool {
        self.system_messages().iter().any(|m| m == message)
    }

    pub fn last_system_message(&self) -> Option<String> {
        self.system_messages().last().cloned()
    }

    pub fn private_lines(&self) -> Vec<(PeerCode, String)> {
        self.private_lines.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.lines.lock().unwrap().clear();
        self.private_lines.lock().unwrap().clear();
    }
}

impl ChatWindowSink for RecordingChat {
    fn append_to_chat(&self, text: &str, _color: i32) {
        self.lines.lock().unwrap().push(text.to_string());
    }

    fn append_to_private_chat(&self, peer: &Peer, text: &str, _color: i32) {
        self.private_lines
            .lock()
            .unwrap()
            .push((peer.code, text.to_string()));
    }
}

#[derive(Default)]
pub struct RecordingUi {
    pub topics_shown: AtomicUsize,
    pub messages_notified: AtomicUsize,
    pub private_messages_notified: AtomicUsize,
    pub cleared: AtomicBool,
    pub quit: AtomicBool,
    pub private_chats: Mutex<Vec<PeerCode>>,
    pub transfers: Mutex<Vec<Transfer>>,
}

impl UserInterfaceSink for RecordingUi {
    fn show_topic(&self, _topic: &Topic) {
        self.topics_shown.fetch_add(1, Ordering::SeqCst);
    }

    fn notify_message_arrived(&self, _peer: &Peer, _text: &str) {
        self.messages_notified.fetch_add(1, Ordering::SeqCst);
    }

    fn notify_private_message_arrived(&self, _peer: &Peer, _text: &str) {
        self.private_messages_notified.fetch_add(1, Ordering::SeqCst);
    }

    fn clear_chat(&self) {
        self.cleared.store(true, Ordering::SeqCst);
    }

    fn quit(&self) {
        self.quit.store(true, Ordering::SeqCst);
    }

    fn create_private_chat(&self, peer: &Peer) {
        self.private_chats.lock().unwrap().push(peer.code);
    }

    fn show_transfer(&self, transfer: &Transfer) {
        self.transfers.lock().unwrap().push(transfer.clone());
    }
}

#[derive(Default)]
pub struct RecordingPump {
    pub prepared: Mutex<Vec<u32>>,
    pub started: Mutex<Vec<(u32, PeerAddress)>>,
    pub canceled: Mutex<Vec<u32>>,
    pub updates: Mutex<Option<TransferUpdates>>,
}

impl FileTransferPump for RecordingPump {
    fn prepare_receive(&self, transfer: &Transfer, updates: TransferUpdates) -> Result<u16, String> {
        self.prepared.lock().unwrap().push(transfer.id);
        *self.updates.lock().unwrap() = Some(updates);
        Ok(50123)
    }

    fn start_send(&self, transfer: &Transfer, target: PeerAddress, updates: TransferUpdates) {
        self.started.lock().unwrap().push((transfer.id, target));
        *self.updates.lock().unwrap() = Some(updates);
    }

    fn cancel(&self, transfer: &Transfer) {
        self.canceled.lock().unwrap().push(transfer.id);
    }
}

pub struct Harness {
    pub engine: ChatEngine,
    pub transport: Arc<RecordingTransport>,
    pub chat: Arc<RecordingChat>,
    pub ui: Arc<RecordingUi>,
    pub pump: Arc<RecordingPump>,
    pub dir: tempfile::TempDir,
}

impl Harness {
    /// An engine that has not seen the network yet.
    pub fn new(nick: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let settings = Arc::new(Settings::new(
            ME,
            SettingsData {
                nick: nick.to_string(),
                download_dir: dir.path().to_path_buf(),
                ..Default::default()
            },
        ));

        let transport = Arc::new(RecordingTransport::default());
        let chat = Arc::new(RecordingChat::default());
        let ui = Arc::new(RecordingUi::default());
        let pump = Arc::new(RecordingPump::default());

        let engine = ChatEngine::new(
            settings,
            Collaborators {
                transport: transport.clone(),
                chat: chat.clone(),
                ui: ui.clone(),
                pump: pump.clone(),
            },
        );

        Self {
            engine,
            transport,
            chat,
            ui,
            pump,
            dir,
        }
    }

    /// An engine whose logon came back from the network. Recorded traffic
    /// and chat lines are cleared.
    pub fn logged_on(nick: &str) -> Self {
        let harness = Self::new(nick);
        harness.engine.controller().network_came_up();
        harness.receive(&format!("{}!LOGON#{}:", ME.0, nick), MY_IP);
        assert!(harness.engine.controller().is_connected());

        harness.transport.clear();
        harness.chat.clear();
        harness
    }

    /// Logged on and past the startup grace period.
    pub fn completed(nick: &str) -> Self {
        let harness = Self::logged_on(nick);
        harness
            .engine
            .controller()
            .chat_state()
            .set_logon_completed(true);
        harness
    }

    pub fn with_identify_wait(mut self, wait: Duration) -> Self {
        self.engine = self.engine.with_identify_wait(wait);
        self
    }

    pub fn receive(&self, line: &str, ip_address: &str) {
        self.engine.on_line_received(line, ip_address);
    }

    pub fn receive_private(&self, line: &str, ip_address: &str) {
        self.engine.on_private_line_received(line, ip_address);
    }

    /// Register a peer through its LOGON and CLIENT messages.
    pub fn add_peer(&self, code: u32, nick: &str, ip_address: &str) {
        self.receive(&format!("{}!LOGON#{}:", code, nick), ip_address);
        self.receive(
            &format!("{}!CLIENT#{}:(LanChat v0.1.0)[5000]{{linux}}<40656>", code, nick),
            ip_address,
        );
    }

    pub fn peer(&self, code: u32) -> Option<Peer> {
        self.engine
            .controller()
            .registry()
            .find_by_code(PeerCode(code))
    }

    pub fn nicks(&self) -> Vec<String> {
        self.engine
            .controller()
            .registry()
            .snapshot()
            .into_iter()
            .map(|p| p.nick)
            .collect()
    }
}
