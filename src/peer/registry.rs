use super::session::SessionHandle;
use crate::constants::MAX_UNCHOKED;
use parking_lot::Mutex;
use std::sync::Arc;

/// Global counter of granted upload slots.
///
/// Granting is a test-and-increment against the fixed cap; releasing is
/// unconditional. Sessions acquire a slot when an interested peer gets
/// unchoked and release it when the grant is revoked or the session
/// dies; the choke scheduler moves slots between sessions without
/// touching the count, correcting it only when a move half-fails.
pub struct UnchokeSlots {
    granted: Mutex<usize>,
    cap: usize,
}

impl UnchokeSlots {
    pub fn new(cap: usize) -> Self {
        Self {
            granted: Mutex::new(0),
            cap,
        }
    }

    /// Takes a slot if one is free.
    pub fn try_acquire(&self) -> bool {
        let mut granted = self.granted.lock();
        if *granted < self.cap {
            *granted += 1;
            true
        } else {
            false
        }
    }

    pub fn release(&self) {
        let mut granted = self.granted.lock();
        *granted = granted.saturating_sub(1);
    }

    pub fn granted(&self) -> usize {
        *self.granted.lock()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }
}

/// The live set of peer sessions plus the shared slot counter.
///
/// One registry exists per download and is passed explicitly to every
/// session and to the choke scheduler.
pub struct PeerRegistry {
    peers: Mutex<Vec<Arc<SessionHandle>>>,
    slots: UnchokeSlots,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self {
            peers: Mutex::new(Vec::new()),
            slots: UnchokeSlots::new(MAX_UNCHOKED),
        }
    }

    pub fn slots(&self) -> &UnchokeSlots {
        &self.slots
    }

    pub(crate) fn register(&self, handle: Arc<SessionHandle>) {
        self.peers.lock().push(handle);
    }

    pub(crate) fn remove(&self, handle: &Arc<SessionHandle>) {
        self.peers.lock().retain(|peer| !Arc::ptr_eq(peer, handle));
    }

    /// Drops handles whose sockets have closed.
    pub fn prune(&self) {
        self.peers.lock().retain(|peer| peer.is_connected());
    }

    /// The currently connected sessions.
    pub fn snapshot(&self) -> Vec<Arc<SessionHandle>> {
        self.peers
            .lock()
            .iter()
            .filter(|peer| peer.is_connected())
            .cloned()
            .collect()
    }

    /// True if a connected session already uses this peer id; used to
    /// avoid dialing the same peer twice.
    pub fn has_peer(&self, peer_id: &[u8; 20]) -> bool {
        self.peers
            .lock()
            .iter()
            .any(|peer| peer.is_connected() && peer.peer_id() == peer_id)
    }

    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.lock().is_empty()
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
