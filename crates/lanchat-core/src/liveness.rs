//! Heartbeats and timeout detection.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use lanchat_shared::constants::{HEARTBEAT_INTERVAL_SECS, PEER_TIMEOUT_SECS};

use crate::controller::Controller;
use crate::peer::Peer;

/// Broadcasts IDLE periodically and evicts peers that stopped doing so.
pub struct LivenessMonitor {
    controller: Arc<Controller>,
    interval: Duration,
    timeout: Duration,
}

impl LivenessMonitor {
    pub fn new(controller: Arc<Controller>) -> Self {
        Self {
            controller,
            interval: Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
            timeout: Duration::from_secs(PEER_TIMEOUT_SECS),
        }
    }

    pub fn with_timing(mut self, interval: Duration, timeout: Duration) -> Self {
        self.interval = interval;
        self.timeout = timeout;
        self
    }

    /// One round: send our heartbeat and evict everyone silent for longer
    /// than the timeout. Returns the evicted peers.
    pub fn tick(&self, now: Instant) -> Vec<Peer> {
        let controller = &self.controller;

        if controller.is_connected() {
            controller.messages().send_idle();
        }

        let Some(deadline) = now.checked_sub(self.timeout) else {
            return Vec::new();
        };

        let mut evicted = Vec::new();
        for peer in controller.registry().snapshot() {
            if peer.is_self || peer.last_heartbeat >= deadline {
                continue;
            }

            info!(code = %peer.code, nick = %peer.nick, "Peer timed out");
            if let Some(peer) = controller.remove_peer(peer.code, &format!("{} timed out", peer.nick))
            {
                evicted.push(peer);
            }
        }

        if !evicted.is_empty() {
            controller.registry().recalculate();
            controller.update_after_timeout();
        }
        evicted
    }

    /// Tick until shutdown.
    pub async fn run(self) {
        let mut shutdown = self.controller.shutdown_signal();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(Instant::now());
                }
                _ = shutdown.wait_for(|stopped| *stopped) => {
                    debug!("Liveness monitor stopped");
                    break;
                }
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
