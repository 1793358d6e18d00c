use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tracing::debug;

use crate::connection::{PeerConnection, PeerId, PeerInfo};

/// Live peers keyed by id.
///
/// The lock is held for insert, remove and snapshot only; queueing and
/// socket work happen on a snapshot.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: Mutex<HashMap<PeerId, Arc<PeerConnection>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PeerId, Arc<PeerConnection>>> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a peer. A peer that already started closing is not added.
    pub fn insert(&self, conn: Arc<PeerConnection>) -> bool {
        let mut peers = self.lock();
        if !conn.is_open() {
            return false;
        }
        peers.insert(conn.id(), conn);
        true
    }

    pub fn remove(&self, id: PeerId) -> Option<Arc<PeerConnection>> {
        let removed = self.lock().remove(&id);
        if removed.is_some() {
            debug!(peer = id, "peer unregistered");
        }
        removed
    }

    pub fn get(&self, id: PeerId) -> Option<Arc<PeerConnection>> {
        self.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Current peers, ordered by id.
    pub fn snapshot(&self) -> Vec<Arc<PeerConnection>> {
        let mut peers: Vec<_> = self.lock().values().cloned().collect();
        peers.sort_by_key(|peer| peer.id());
        peers
    }

    pub fn infos(&self) -> Vec<PeerInfo> {
        self.snapshot().iter().map(|peer| peer.info()).collect()
    }

    /// Queue one framed document to every live peer. Returns how many took it.
    pub fn broadcast(&self, doc: &Bytes) -> usize {
        self.snapshot()
            .into_iter()
            .filter(|peer| peer.enqueue(doc.clone()))
            .count()
    }

    /// Close every peer. Their reader workers unregister them.
    pub fn close_all(&self) {
        for peer in self.snapshot() {
            peer.close();
        }
    }
}
