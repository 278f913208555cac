//! Probe-and-defer handling of messages from senders we do not know yet.
//!
//! A message that only makes sense for a known peer (MSG, TOPIC, NICK, ...)
//! can arrive before the sender's LOGON or EXPOSING, for instance when we
//! join a chat that is already running. The sender's code goes on the
//! [`WaitingList`], EXPOSE and GETTOPIC are broadcast once for that probing
//! episode, and the message is parked in a task until the sender shows up or
//! the wait times out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::debug;

use lanchat_shared::constants::{IDENTIFY_MAX_ATTEMPTS, IDENTIFY_POLL_MILLIS, IDENTIFY_WORKERS};
use lanchat_shared::protocol::{MessageType, WireMessage};
use lanchat_shared::types::PeerCode;

use crate::controller::Controller;
use crate::dispatcher::{MessageDispatcher, Origin};

/// Message types that are dropped or deferred when the sender is unknown.
pub fn needs_known_sender(message_type: MessageType) -> bool {
    matches!(
        message_type,
        MessageType::Msg
            | MessageType::Topic
            | MessageType::Away
            | MessageType::Back
            | MessageType::Nick
            | MessageType::Idle
            | MessageType::Writing
            | MessageType::StoppedWriting
            | MessageType::Client
            | MessageType::SendFile
            | MessageType::PrivMsg
    )
}

/// One registration on the waiting list.
#[derive(Debug)]
pub struct Probe {
    pub code: PeerCode,
    /// Identifies the probing episode this probe belongs to.
    pub episode: u64,
    /// Flips to `true` once the peer identified itself.
    pub identified: watch::Receiver<bool>,
    /// This probe started a new episode, so the peer should be asked to
    /// expose itself.
    pub started: bool,
}

struct Waiting {
    episode: u64,
    signal: watch::Sender<bool>,
}

/// Codes of peers we are waiting to hear a LOGON or EXPOSING from.
#[derive(Default)]
pub struct WaitingList {
    entries: Mutex<HashMap<PeerCode, Waiting>>,
    episodes: AtomicU64,
}

impl WaitingList {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PeerCode, Waiting>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for `code`, joining the current episode if there is one.
    pub fn add(&self, code: PeerCode) -> Probe {
        let mut entries = self.lock();

        if let Some(waiting) = entries.get(&code) {
            return Probe {
                code,
                episode: waiting.episode,
                identified: waiting.signal.subscribe(),
                started: false,
            };
        }

        let episode = self.episodes.fetch_add(1, Ordering::Relaxed) + 1;
        let (signal, identified) = watch::channel(false);
        entries.insert(code, Waiting { episode, signal });
        debug!(code = %code, episode, "Waiting for unknown peer to identify");

        Probe {
            code,
            episode,
            identified,
            started: true,
        }
    }

    /// The peer identified itself. Wakes every waiter.
    ///
    /// Returns `true` if the code was being waited for.
    pub fn remove(&self, code: PeerCode) -> bool {
        match self.lock().remove(&code) {
            Some(waiting) => {
                waiting.signal.send_replace(true);
                true
            }
            None => false,
        }
    }

    /// Give up on an episode. A newer episode for the same code is left alone.
    pub fn abandon(&self, code: PeerCode, episode: u64) -> bool {
        let mut entries = self.lock();
        match entries.get(&code) {
            Some(waiting) if waiting.episode == episode => {
                entries.remove(&code);
                debug!(code = %code, episode, "Gave up waiting for peer");
                true
            }
            _ => false,
        }
    }

    pub fn is_waiting(&self, code: PeerCode) -> bool {
        self.lock().contains_key(&code)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every entry. Waiters wake up without the peer being identified.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// Routes decoded messages to the dispatcher, deferring those from unknown
/// senders.
pub struct IdentificationGate {
    controller: Arc<Controller>,
    dispatcher: Arc<MessageDispatcher>,
    workers: Arc<Semaphore>,
    wait: Duration,
}

impl IdentificationGate {
    pub fn new(controller: Arc<Controller>, dispatcher: Arc<MessageDispatcher>) -> Self {
        Self {
            controller,
            dispatcher,
            workers: Arc::new(Semaphore::new(IDENTIFY_WORKERS)),
            wait: Duration::from_millis(IDENTIFY_POLL_MILLIS * IDENTIFY_MAX_ATTEMPTS),
        }
    }

    /// Change how long a deferred message waits for its sender.
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Dispatch now if the sender is known, otherwise probe and defer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn route(&self, message: WireMessage, ip_address: String, origin: Origin) {
        let code = message.sender;

        if !needs_known_sender(message.message_type())
            || !self.controller.registry().is_new_peer(code)
        {
            self.dispatcher.dispatch(&message, &ip_address, origin);
            return;
        }

        let probe = self.controller.waiting_list().add(code);
        if probe.started {
            let messages = self.controller.messages();
            messages.send_expose();
            messages.send_get_topic();
        }

        debug!(
            code = %code,
            kind = %message.message_type(),
            episode = probe.episode,
            "Deferring message from unknown peer"
        );

        let controller = self.controller.clone();
        let dispatcher = self.dispatcher.clone();
        let workers = self.workers.clone();
        let wait = self.wait;

        tokio::spawn(async move {
            let mut shutdown = controller.shutdown_signal();
            let mut identified = probe.identified;

            let _permit = tokio::select! {
                permit = workers.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
                _ = shutdown.wait_for(|stopped| *stopped) => return,
            };

            let identified_in_time = tokio::select! {
                result = tokio::time::timeout(wait, identified.wait_for(|known| *known)) => {
                    matches!(result, Ok(Ok(_)))
                }
                _ = shutdown.wait_for(|stopped| *stopped) => {
                    debug!(code = %code, "Dropping deferred message on shutdown");
                    return;
                }
            };

            if !identified_in_time {
                controller.waiting_list().abandon(code, probe.episode);
                debug!(code = %code, "Peer did not identify in time, handling anyway");
            }

            if controller.is_shut_down() || !controller.chat_state().is_logged_on() {
                debug!(code = %code, "Dropping deferred message, no longer logged on");
                return;
            }

            dispatcher.dispatch(&message, &ip_address, origin);
        });
    }
}
