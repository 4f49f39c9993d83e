use std::{
    cell::RefCell,
    collections::{HashMap, HashSet, VecDeque},
    rc::Rc,
};

use log::{trace, warn};

use crate::{
    NetworkEvent, PeerId, Roster, Transport, TransportError, TransportEvent, WireMessage,
};

enum HubSignal {
    Connected(PeerId),
    Disconnected(PeerId),
    Frame(PeerId, Vec<u8>),
}

#[derive(Default)]
struct HubInner {
    mailboxes: HashMap<PeerId, VecDeque<HubSignal>>,
    links: HashSet<(PeerId, PeerId)>,
}

impl HubInner {
    fn link_key(a: &PeerId, b: &PeerId) -> (PeerId, PeerId) {
        if a <= b {
            (a.clone(), b.clone())
        } else {
            (b.clone(), a.clone())
        }
    }

    fn post(&mut self, to: &PeerId, signal: HubSignal) {
        if let Some(mailbox) = self.mailboxes.get_mut(to) {
            mailbox.push_back(signal);
        }
    }

    fn unlink(&mut self, a: &PeerId, b: &PeerId) -> bool {
        if !self.links.remove(&Self::link_key(a, b)) {
            return false;
        }
        self.post(a, HubSignal::Disconnected(b.clone()));
        self.post(b, HubSignal::Disconnected(a.clone()));
        true
    }
}

/// In-process switchboard linking any number of [`LocalTransport`]s, for
/// tests and single-process sessions. Frames are JSON encoded exactly as on
/// a real link.
#[derive(Clone, Default)]
pub struct LocalHub {
    inner: Rc<RefCell<HubInner>>,
}

impl LocalHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Panics
    ///
    /// Panics if `peer_id` already has a transport on this hub.
    pub fn transport(&self, peer_id: impl Into<PeerId>) -> LocalTransport {
        match self.try_transport(peer_id) {
            Ok(transport) => transport,
            Err(error) => panic!("{}", error),
        }
    }

    pub fn try_transport(&self, peer_id: impl Into<PeerId>) -> Result<LocalTransport, TransportError> {
        let peer_id = peer_id.into();
        let mut inner = self.inner.borrow_mut();
        if inner.mailboxes.contains_key(&peer_id) {
            return Err(TransportError::PeerIdTaken {
                peer_id: peer_id.to_string(),
            });
        }
        inner.mailboxes.insert(peer_id.clone(), VecDeque::new());
        Ok(LocalTransport {
            hub: self.clone(),
            local_peer_id: peer_id,
            roster: Roster::new(),
        })
    }

    pub fn online_peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.inner.borrow().mailboxes.keys().cloned().collect();
        peers.sort();
        peers
    }

    pub fn is_linked(&self, a: &PeerId, b: &PeerId) -> bool {
        self.inner
            .borrow()
            .links
            .contains(&HubInner::link_key(a, b))
    }

    /// Drops the link between two peers as a network fault would
    pub fn sever(&self, a: &PeerId, b: &PeerId) -> bool {
        self.inner.borrow_mut().unlink(a, b)
    }

    /// Delivers raw bytes as if `from` had sent them, bypassing encoding
    pub fn inject_frame(&self, from: &PeerId, to: &PeerId, bytes: Vec<u8>) {
        self.inner
            .borrow_mut()
            .post(to, HubSignal::Frame(from.clone(), bytes));
    }

    fn leave(&self, peer_id: &PeerId) {
        let Ok(mut inner) = self.inner.try_borrow_mut() else {
            warn!("LocalHub busy, {} left without notifying links", peer_id);
            return;
        };
        inner.mailboxes.remove(peer_id);
        let linked: Vec<(PeerId, PeerId)> = inner
            .links
            .iter()
            .filter(|(a, b)| a == peer_id || b == peer_id)
            .cloned()
            .collect();
        for (a, b) in linked {
            inner.unlink(&a, &b);
        }
    }
}

/// One peer's endpoint on a [`LocalHub`]. Dropping it takes the peer off
/// the hub and disconnects it from everyone.
pub struct LocalTransport {
    hub: LocalHub,
    local_peer_id: PeerId,
    roster: Roster,
}

impl Transport for LocalTransport {
    fn local_peer_id(&self) -> &PeerId {
        &self.local_peer_id
    }

    fn roster(&self) -> Roster {
        self.roster.clone()
    }

    fn connect(&mut self, peer_id: &PeerId) -> Result<(), TransportError> {
        if *peer_id == self.local_peer_id {
            return Err(TransportError::SelfConnect {
                peer_id: peer_id.to_string(),
            });
        }
        let mut inner = self.hub.inner.borrow_mut();
        if !inner.mailboxes.contains_key(peer_id) {
            return Err(TransportError::UnknownPeer {
                peer_id: peer_id.to_string(),
            });
        }
        if !inner
            .links
            .insert(HubInner::link_key(&self.local_peer_id, peer_id))
        {
            return Ok(());
        }
        inner.post(&self.local_peer_id, HubSignal::Connected(peer_id.clone()));
        inner.post(peer_id, HubSignal::Connected(self.local_peer_id.clone()));
        Ok(())
    }

    fn disconnect(&mut self, peer_id: &PeerId) {
        self.hub
            .inner
            .borrow_mut()
            .unlink(&self.local_peer_id, peer_id);
    }

    fn send(&mut self, peer_id: &PeerId, event: &NetworkEvent) -> Result<(), TransportError> {
        let mut inner = self.hub.inner.borrow_mut();
        if !inner
            .links
            .contains(&HubInner::link_key(&self.local_peer_id, peer_id))
        {
            return Err(TransportError::NotConnected {
                peer_id: peer_id.to_string(),
            });
        }
        let bytes = WireMessage::Event(event.clone()).encode()?;
        inner.post(peer_id, HubSignal::Frame(self.local_peer_id.clone(), bytes));
        Ok(())
    }

    fn receive(&mut self) -> Option<TransportEvent> {
        loop {
            let signal = self
                .hub
                .inner
                .borrow_mut()
                .mailboxes
                .get_mut(&self.local_peer_id)?
                .pop_front()?;
            match signal {
                HubSignal::Connected(peer_id) => {
                    self.roster.insert(&peer_id);
                    return Some(TransportEvent::Connected(peer_id));
                }
                HubSignal::Disconnected(peer_id) => {
                    self.roster.remove(&peer_id);
                    return Some(TransportEvent::Disconnected(peer_id));
                }
                HubSignal::Frame(from, bytes) => match WireMessage::decode(&bytes) {
                    Ok(WireMessage::Event(mut event)) => {
                        event.send_from = from.clone();
                        return Some(TransportEvent::Message(from, event));
                    }
                    Ok(WireMessage::Hello { peer_id }) => {
                        trace!("Ignoring hello from {} on local link", peer_id);
                    }
                    Err(error) => {
                        warn!("Dropping frame from {}: {}", from, error);
                    }
                },
            }
        }
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        self.hub.leave(&self.local_peer_id);
    }
}
