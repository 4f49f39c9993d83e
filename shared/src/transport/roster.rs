use std::{cell::RefCell, rc::Rc};

use crate::PeerId;

/// The peers currently reachable, in connection order. Shared between a
/// transport, which keeps it current, and whoever needs to read it.
#[derive(Clone, Default)]
pub struct Roster {
    peers: Rc<RefCell<Vec<PeerId>>>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.peers.borrow().contains(peer_id)
    }

    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.peers.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.peers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.borrow().is_empty()
    }

    /// Returns false if the peer was already present
    pub fn insert(&self, peer_id: &PeerId) -> bool {
        let mut peers = self.peers.borrow_mut();
        if peers.contains(peer_id) {
            return false;
        }
        peers.push(peer_id.clone());
        true
    }

    /// Returns false if the peer was not present
    pub fn remove(&self, peer_id: &PeerId) -> bool {
        let mut peers = self.peers.borrow_mut();
        let before = peers.len();
        peers.retain(|peer| peer != peer_id);
        peers.len() != before
    }
}
