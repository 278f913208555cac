//! Bookkeeping for file transfers.
//!
//! The chat only negotiates transfers (SENDFILE, SENDFILEACCEPT and
//! SENDFILEABORT). Moving the bytes is left to a [`FileTransferPump`], which
//! reports back through [`TransferUpdate`]s.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

use lanchat_shared::types::{PeerAddress, PeerCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// Offered, waiting for the receiver to answer.
    Waiting,
    /// Accepted, bytes are moving.
    Transferring,
    Completed,
    Failed,
    Canceled,
}

/// A single file transfer with a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// Local id shown to the user, unique for the lifetime of the list.
    pub id: u32,
    pub direction: Direction,
    pub peer: PeerCode,
    pub peer_nick: String,
    /// Name announced on the wire.
    pub file_name: String,
    /// Local file being read or written.
    pub path: PathBuf,
    pub file_size: u64,
    pub file_hash: i32,
    pub status: TransferStatus,
    pub transferred: u64,
    /// Bytes per second.
    pub speed: u64,
}

impl Transfer {
    fn new(
        direction: Direction,
        peer: PeerCode,
        peer_nick: &str,
        file_name: String,
        path: PathBuf,
        file_size: u64,
        file_hash: i32,
    ) -> Self {
        Self {
            id: 0,
            direction,
            peer,
            peer_nick: peer_nick.to_string(),
            file_name,
            path,
            file_size,
            file_hash,
            status: TransferStatus::Waiting,
            transferred: 0,
            speed: 0,
        }
    }

    /// Whether the receiving side has agreed to the transfer.
    pub fn is_accepted(&self) -> bool {
        self.status != TransferStatus::Waiting
    }

    pub fn percent(&self) -> u64 {
        if self.file_size == 0 {
            return 0;
        }
        self.transferred.saturating_mul(100) / self.file_size
    }
}

/// Progress reported by a [`FileTransferPump`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferUpdate {
    Progress { id: u32, transferred: u64, speed: u64 },
    Completed { id: u32 },
    Failed { id: u32 },
}

/// Channel the pump reports progress on.
pub type TransferUpdates = mpsc::UnboundedSender<TransferUpdate>;

/// Moves the bytes of accepted transfers.
pub trait FileTransferPump: Send + Sync {
    /// Get ready to receive an accepted file. Returns the port the sender
    /// should connect to.
    fn prepare_receive(&self, transfer: &Transfer, updates: TransferUpdates) -> Result<u16, String>;

    /// Start sending a file the receiver accepted.
    fn start_send(&self, transfer: &Transfer, target: PeerAddress, updates: TransferUpdates);

    /// Stop a transfer. No further updates are expected for it.
    fn cancel(&self, transfer: &Transfer);
}

/// Hash identifying a file in transfer messages.
pub fn file_hash(path: &Path) -> i32 {
    let digest = blake3::hash(path.to_string_lossy().as_bytes());
    let bytes = digest.as_bytes();
    i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[derive(Debug, Default)]
struct TransferListInner {
    transfers: Vec<Transfer>,
    last_id: u32,
}

/// All transfers currently known, in both directions.
#[derive(Debug, Default)]
pub struct TransferList {
    inner: Mutex<TransferListInner>,
}

impl TransferList {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TransferListInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a new transfer, assigning it the next id.
    fn add(&self, mut transfer: Transfer) -> Transfer {
        let mut inner = self.lock();
        inner.last_id += 1;
        transfer.id = inner.last_id;

        debug!(
            id = transfer.id,
            direction = ?transfer.direction,
            peer = %transfer.peer,
            file = %transfer.file_name,
            "Registered file transfer"
        );
        inner.transfers.push(transfer.clone());
        transfer
    }

    /// Register a file we offer to a peer.
    pub fn add_sender(
        &self,
        peer: PeerCode,
        peer_nick: &str,
        path: PathBuf,
        file_size: u64,
        file_hash: i32,
    ) -> Transfer {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.add(Transfer::new(
            Direction::Send,
            peer,
            peer_nick,
            file_name,
            path,
            file_size,
            file_hash,
        ))
    }

    /// Register a file a peer offers to us.
    pub fn add_receiver(
        &self,
        peer: PeerCode,
        peer_nick: &str,
        path: PathBuf,
        file_name: &str,
        file_size: u64,
        file_hash: i32,
    ) -> Transfer {
        self.add(Transfer::new(
            Direction::Receive,
            peer,
            peer_nick,
            file_name.to_string(),
            path,
            file_size,
            file_hash,
        ))
    }

    pub fn get(&self, id: u32) -> Option<Transfer> {
        self.lock().transfers.iter().find(|t| t.id == id).cloned()
    }

    /// Transfer with the given id, in either direction, with the given peer.
    pub fn find(&self, peer: PeerCode, id: u32) -> Option<Transfer> {
        self.lock()
            .transfers
            .iter()
            .find(|t| t.peer == peer && t.id == id)
            .cloned()
    }

    pub fn find_receiver_by_id(&self, peer: PeerCode, id: u32) -> Option<Transfer> {
        self.find(peer, id)
            .filter(|t| t.direction == Direction::Receive)
    }

    /// Our outgoing offer matching an answer from the receiver.
    pub fn find_sender(&self, peer: PeerCode, file_name: &str, file_hash: i32) -> Option<Transfer> {
        self.lock()
            .transfers
            .iter()
            .find(|t| {
                t.direction == Direction::Send
                    && t.peer == peer
                    && t.file_name == file_name
                    && t.file_hash == file_hash
            })
            .cloned()
    }

    pub fn find_receiver(&self, peer: PeerCode, file_name: &str) -> Option<Transfer> {
        self.lock()
            .transfers
            .iter()
            .find(|t| t.direction == Direction::Receive && t.peer == peer && t.file_name == file_name)
            .cloned()
    }

    /// Modify a transfer in place, returning the updated copy.
    pub fn update<F>(&self, id: u32, f: F) -> Option<Transfer>
    where
        F: FnOnce(&mut Transfer),
    {
        let mut inner = self.lock();
        let transfer = inner.transfers.iter_mut().find(|t| t.id == id)?;
        f(transfer);
        Some(transfer.clone())
    }

    pub fn remove(&self, id: u32) -> Option<Transfer> {
        let mut inner = self.lock();
        let index = inner.transfers.iter().position(|t| t.id == id)?;
        Some(inner.transfers.remove(index))
    }

    /// Remove every transfer with a peer, returning them.
    pub fn remove_all_for(&self, peer: PeerCode) -> Vec<Transfer> {
        let mut inner = self.lock();
        let (removed, kept) = std::mem::take(&mut inner.transfers)
            .into_iter()
            .partition(|t| t.peer == peer);
        inner.transfers = kept;
        removed
    }

    /// Update the nick shown for a peer's transfers.
    pub fn rename_peer(&self, peer: PeerCode, nick: &str) {
        for transfer in self.lock().transfers.iter_mut().filter(|t| t.peer == peer) {
            transfer.peer_nick = nick.to_string();
        }
    }

    pub fn senders(&self) -> Vec<Transfer> {
        self.by_direction(Direction::Send)
    }

    pub fn receivers(&self) -> Vec<Transfer> {
        self.by_direction(Direction::Receive)
    }

    fn by_direction(&self, direction: Direction) -> Vec<Transfer> {
        self.lock()
            .transfers
            .iter()
            .filter(|t| t.direction == direction)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().transfers.is_empty()
    }
}

/// `name.ext` becomes `name_1.ext`, `name_2.ext` and so on until a free
/// name is found.
pub fn incremented_path(existing: &Path) -> PathBuf {
    if !existing.exists() {
        return existing.to_path_buf();
    }

    let stem = existing
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = existing
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut counter = 1;
    loop {
        let candidate = existing.with_file_name(format!("{stem}_{counter}{extension}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_increase_across_directions() {
        let list = TransferList::new();
        let send = list.add_sender(PeerCode(1), "Amy", PathBuf::from("/tmp/a.txt"), 10, 5);
        let recv = list.add_receiver(PeerCode(2), "Bob", PathBuf::from("/tmp/b.txt"), "b.txt", 20, 6);

        assert_eq!(send.id, 1);
        assert_eq!(send.file_name, "a.txt");
        assert_eq!(recv.id, 2);
        assert_eq!(list.senders().len(), 1);
        assert_eq!(list.receivers().len(), 1);

        list.remove(1);
        let next = list.add_sender(PeerCode(1), "Amy", PathBuf::from("/tmp/c.txt"), 10, 5);
        assert_eq!(next.id, 3);
    }

    #[test]
    fn test_lookup() {
        let list = TransferList::new();
        let send = list.add_sender(PeerCode(1), "Amy", PathBuf::from("/tmp/a.txt"), 10, 5);
        let recv = list.add_receiver(PeerCode(1), "Amy", PathBuf::from("/tmp/b.txt"), "b.txt", 20, 6);

        assert_eq!(list.find(PeerCode(1), send.id), Some(send.clone()));
        assert_eq!(list.find(PeerCode(2), send.id), None);
        assert_eq!(list.find_receiver_by_id(PeerCode(1), send.id), None);
        assert_eq!(list.find_receiver_by_id(PeerCode(1), recv.id), Some(recv.clone()));
        assert_eq!(list.find_sender(PeerCode(1), "a.txt", 5), Some(send));
        assert_eq!(list.find_sender(PeerCode(1), "a.txt", 6), None);
        assert_eq!(list.find_receiver(PeerCode(1), "b.txt"), Some(recv));
    }

    #[test]
    fn test_remove_all_for_peer() {
        let list = TransferList::new();
        list.add_sender(PeerCode(1), "Amy", PathBuf::from("/tmp/a.txt"), 10, 5);
        list.add_receiver(PeerCode(1), "Amy", PathBuf::from("/tmp/b.txt"), "b.txt", 20, 6);
        list.add_sender(PeerCode(2), "Bob", PathBuf::from("/tmp/c.txt"), 10, 7);

        let removed = list.remove_all_for(PeerCode(1));
        assert_eq!(removed.len(), 2);
        assert_eq!(list.len(), 1);
        assert!(list.remove_all_for(PeerCode(1)).is_empty());
    }

    #[test]
    fn test_progress() {
        let list = TransferList::new();
        let transfer = list.add_sender(PeerCode(1), "Amy", PathBuf::from("/tmp/a.txt"), 200, 5);
        assert!(!transfer.is_accepted());

        let updated = list
            .update(transfer.id, |t| {
                t.status = TransferStatus::Transferring;
                t.transferred = 50;
            })
            .unwrap();
        assert!(updated.is_accepted());
        assert_eq!(updated.percent(), 25);
    }

    #[test]
    fn test_file_hash_is_stable() {
        let a = file_hash(Path::new("/home/amy/image.png"));
        assert_eq!(a, file_hash(Path::new("/home/amy/image.png")));
        assert_ne!(a, file_hash(Path::new("/home/amy/other.png")));
    }

    #[test]
    fn test_incremented_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("doc.pdf");
        assert_eq!(incremented_path(&file), file);

        std::fs::write(&file, b"x").unwrap();
        assert_eq!(incremented_path(&file), dir.path().join("doc_1.pdf"));

        std::fs::write(dir.path().join("doc_1.pdf"), b"x").unwrap();
        assert_eq!(incremented_path(&file), dir.path().join("doc_2.pdf"));
    }
}
