//! Sorted registry of known peers.
//!
//! Peers are kept ordered by case-insensitive nick. Every mutation re-sorts
//! and queues a [`RegistryEvent`] to each subscriber before the lock is
//! released, so the index carried by an event always matches the order the
//! subscriber would observe right after the change.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

use lanchat_shared::types::PeerCode;

use crate::peer::Peer;

/// Positional change notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Added { index: usize, peer: Peer },
    Changed { index: usize, peer: Peer },
    Removed { index: usize, peer: Peer },
    /// Aggregate peer state should be recomputed, e.g. after timeouts.
    Recalculate,
}

#[derive(Default)]
struct RegistryInner {
    peers: Vec<Peer>,
    listeners: Vec<mpsc::UnboundedSender<RegistryEvent>>,
}

impl RegistryInner {
    fn sort(&mut self) {
        self.peers.sort_by_key(|peer| peer.nick.to_ascii_lowercase());
    }

    fn position(&self, code: PeerCode) -> Option<usize> {
        self.peers.iter().position(|peer| peer.code == code)
    }

    fn notify(&mut self, event: RegistryEvent) {
        self.listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Insert, sort and report where the peer ended up.
    fn insert_sorted(&mut self, peer: Peer) -> usize {
        let code = peer.code;
        self.peers.push(peer);
        self.sort();
        self.position(code).unwrap_or_default()
    }
}

/// Thread safe peer registry.
#[derive(Default)]
pub struct PeerRegistry {
    inner: Mutex<RegistryInner>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a listener for positional change events.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<RegistryEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().listeners.push(tx);
        rx
    }

    /// Add a peer. A peer with the same code is replaced instead of
    /// duplicated.
    ///
    /// Returns `true` if the peer was not registered before.
    pub fn add(&self, peer: Peer) -> bool {
        let mut inner = self.lock();
        let code = peer.code;

        if let Some(existing) = inner.position(code) {
            inner.peers.remove(existing);
            let index = inner.insert_sorted(peer.clone());
            debug!(code = %code, nick = %peer.nick, index, "Replaced existing peer");
            inner.notify(RegistryEvent::Changed { index, peer });
            return false;
        }

        let index = inner.insert_sorted(peer.clone());
        debug!(code = %code, nick = %peer.nick, index, "Added peer");
        inner.notify(RegistryEvent::Added { index, peer });
        true
    }

    pub fn get(&self, index: usize) -> Option<Peer> {
        self.lock().peers.get(index).cloned()
    }

    pub fn index_of(&self, code: PeerCode) -> Option<usize> {
        self.lock().position(code)
    }

    /// Remove a peer, returning the removed entry.
    pub fn remove(&self, code: PeerCode) -> Option<Peer> {
        let mut inner = self.lock();
        let index = inner.position(code)?;
        let peer = inner.peers.remove(index);

        debug!(code = %code, nick = %peer.nick, index, "Removed peer");
        inner.notify(RegistryEvent::Removed {
            index,
            peer: peer.clone(),
        });
        Some(peer)
    }

    /// Replace the entry at `index` and re-sort.
    ///
    /// Returns `false` if the index is out of bounds.
    pub fn replace(&self, index: usize, peer: Peer) -> bool {
        let mut inner = self.lock();
        if index >= inner.peers.len() {
            return false;
        }

        inner.peers.remove(index);
        let new_index = inner.insert_sorted(peer.clone());
        inner.notify(RegistryEvent::Changed {
            index: new_index,
            peer,
        });
        true
    }

    /// Copy, modify and replace the peer with the given code in one step.
    ///
    /// Returns the updated peer, or `None` if the code is unknown.
    pub fn update<F>(&self, code: PeerCode, f: F) -> Option<Peer>
    where
        F: FnOnce(&mut Peer),
    {
        let mut inner = self.lock();
        let index = inner.position(code)?;

        let mut peer = inner.peers[index].clone();
        f(&mut peer);
        // the code is the identity of the entry
        peer.code = code;

        inner.peers.remove(index);
        let new_index = inner.insert_sorted(peer.clone());
        inner.notify(RegistryEvent::Changed {
            index: new_index,
            peer: peer.clone(),
        });
        Some(peer)
    }

    pub fn len(&self) -> usize {
        self.lock().peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().peers.is_empty()
    }

    pub fn find_by_code(&self, code: PeerCode) -> Option<Peer> {
        self.lock().peers.iter().find(|peer| peer.code == code).cloned()
    }

    /// Case-insensitive nick lookup.
    pub fn find_by_nick(&self, nick: &str) -> Option<Peer> {
        self.lock()
            .peers
            .iter()
            .find(|peer| peer.nick.eq_ignore_ascii_case(nick))
            .cloned()
    }

    /// Whether another peer than ourselves uses the nick, ignoring case.
    pub fn is_nick_in_use(&self, nick: &str) -> bool {
        self.lock()
            .peers
            .iter()
            .any(|peer| !peer.is_self && peer.nick.eq_ignore_ascii_case(nick))
    }

    pub fn is_new_peer(&self, code: PeerCode) -> bool {
        self.lock().position(code).is_none()
    }

    /// Our own entry.
    pub fn me(&self) -> Option<Peer> {
        self.lock().peers.iter().find(|peer| peer.is_self).cloned()
    }

    /// All peers in sort order.
    pub fn snapshot(&self) -> Vec<Peer> {
        self.lock().peers.clone()
    }

    /// Whether any remote peer still carries its code as a placeholder nick.
    pub fn has_timed_out_nicks(&self) -> bool {
        self.lock()
            .peers
            .iter()
            .any(|peer| !peer.is_self && peer.has_code_as_nick())
    }

    /// Tell listeners to recompute aggregate state.
    pub fn recalculate(&self) {
        self.lock().notify(RegistryEvent::Recalculate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(nick: &str, code: u32) -> Peer {
        Peer::new(nick, PeerCode(code))
    }

    fn nicks(registry: &PeerRegistry) -> Vec<String> {
        registry.snapshot().into_iter().map(|p| p.nick).collect()
    }

    #[test]
    fn test_sorted_case_insensitive() {
        let registry = PeerRegistry::new();
        registry.add(peer("zelda", 1));
        registry.add(peer("Amy", 2));
        registry.add(peer("peter", 3));
        registry.add(peer("MySelf", 4));

        assert_eq!(nicks(&registry), vec!["Amy", "MySelf", "peter", "zelda"]);
        assert_eq!(registry.index_of(PeerCode(3)), Some(2));
        assert_eq!(registry.get(0).map(|p| p.code), Some(PeerCode(2)));
        assert_eq!(registry.get(4), None);
    }

    #[test]
    fn test_add_same_code_replaces() {
        let registry = PeerRegistry::new();
        assert!(registry.add(peer("Alice", 100)));
        assert!(!registry.add(peer("Alice", 100)));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.find_by_code(PeerCode(100)).unwrap().nick, "Alice");
    }

    #[test]
    fn test_remove() {
        let registry = PeerRegistry::new();
        registry.add(peer("Alice", 1));
        registry.add(peer("Bob", 2));

        let removed = registry.remove(PeerCode(1)).unwrap();
        assert_eq!(removed.nick, "Alice");
        assert_eq!(registry.len(), 1);
        assert!(registry.is_new_peer(PeerCode(1)));
        assert!(registry.remove(PeerCode(1)).is_none());
    }

    #[test]
    fn test_update_resorts() {
        let registry = PeerRegistry::new();
        registry.add(peer("Alice", 1));
        registry.add(peer("Bob", 2));

        let updated = registry
            .update(PeerCode(1), |p| {
                p.nick = "Carl".to_string();
                p.code = PeerCode(99);
            })
            .unwrap();

        assert_eq!(updated.code, PeerCode(1));
        assert_eq!(nicks(&registry), vec!["Bob", "Carl"]);
        assert!(registry.update(PeerCode(5), |_| {}).is_none());
    }

    #[test]
    fn test_replace_out_of_bounds() {
        let registry = PeerRegistry::new();
        registry.add(peer("Alice", 1));
        assert!(!registry.replace(3, peer("Bob", 2)));
        assert!(registry.replace(0, peer("Alicia", 1)));
        assert_eq!(nicks(&registry), vec!["Alicia"]);
    }

    #[test]
    fn test_nick_lookup() {
        let registry = PeerRegistry::new();
        let mut me = peer("MySelf", 1);
        me.is_self = true;
        registry.add(me);
        registry.add(peer("Other", 2));

        assert_eq!(registry.find_by_nick("other").unwrap().code, PeerCode(2));
        assert!(registry.is_nick_in_use("OTHER"));
        // our own nick does not count
        assert!(!registry.is_nick_in_use("myself"));
        assert_eq!(registry.me().unwrap().code, PeerCode(1));
    }

    #[test]
    fn test_sort_folds_case_like_lookup() {
        let registry = PeerRegistry::new();
        registry.add(peer("éa", 1));
        registry.add(peer("Ébert", 2));
        registry.add(peer("bob", 3));

        // only ASCII letters are folded, as in nick lookups
        assert_eq!(nicks(&registry), vec!["bob", "Ébert", "éa"]);
        assert!(registry.find_by_nick("ébert").is_none());
        assert_eq!(registry.find_by_nick("BOB").unwrap().code, PeerCode(3));
    }

    #[test]
    fn test_timed_out_nicks() {
        let registry = PeerRegistry::new();
        registry.add(peer("Alice", 1));
        assert!(!registry.has_timed_out_nicks());

        registry.add(peer("200", 200));
        assert!(registry.has_timed_out_nicks());
    }

    #[test]
    fn test_events_carry_post_sort_index() {
        let registry = PeerRegistry::new();
        let mut rx = registry.subscribe();

        registry.add(peer("Bob", 2));
        registry.add(peer("Alice", 1));
        registry.update(PeerCode(1), |p| p.nick = "Zed".to_string());
        registry.remove(PeerCode(2));
        registry.recalculate();

        assert!(matches!(
            rx.try_recv().unwrap(),
            RegistryEvent::Added { index: 0, .. }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            RegistryEvent::Added { index: 0, .. }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            RegistryEvent::Changed { index: 1, .. }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            RegistryEvent::Removed { index: 0, .. }
        ));
        assert_eq!(rx.try_recv().unwrap(), RegistryEvent::Recalculate);
    }

    #[test]
    fn test_dropped_listener_is_forgotten() {
        let registry = PeerRegistry::new();
        let rx = registry.subscribe();
        drop(rx);

        registry.add(peer("Alice", 1));
        assert_eq!(registry.lock().listeners.len(), 0);
    }
}
