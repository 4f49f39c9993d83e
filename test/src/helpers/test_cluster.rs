use std::{rc::Rc, time::Duration};

use log::debug;

use tabletop_peer::{Peer, PeerConfig};
use tabletop_shared::{LocalHub, LocalTransport, ManualClock, PeerId, UserId};

/// Enough update rounds for a request and its reply to cross any link
pub const ROUNDS_TO_SETTLE: usize = 6;

/// A set of peers on one [`LocalHub`], all reading the same [`ManualClock`].
///
/// Peers are addressed by their peer id. Every peer gets a cursor named
/// after it when added.
pub struct TestCluster {
    hub: LocalHub,
    clock: ManualClock,
    peers: Vec<Peer<LocalTransport>>,
}

impl TestCluster {
    pub fn new() -> Self {
        Self {
            hub: LocalHub::new(),
            clock: ManualClock::new(),
            peers: Vec::new(),
        }
    }

    pub fn hub(&self) -> &LocalHub {
        &self.hub
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Adds a peer `p-<name>` for user `<name>` with a cursor called `name`
    pub fn add_peer(&mut self, name: &str) -> PeerId {
        let config = PeerConfig {
            user_id: UserId::from(name),
            ..PeerConfig::default()
        };
        self.add_peer_with(name, config)
    }

    pub fn add_peer_with(&mut self, name: &str, config: PeerConfig) -> PeerId {
        let peer_id = Self::peer_id(name);
        let transport = self.hub.transport(peer_id.clone());
        let mut peer = Peer::new(config, transport, Rc::new(self.clock.clone()));
        peer.create_my_cursor(name);
        debug!("Cluster added {}", peer_id);
        self.peers.push(peer);
        peer_id
    }

    /// Takes a peer off the hub, as if its process went away
    pub fn remove_peer(&mut self, name: &str) -> Option<Peer<LocalTransport>> {
        let peer_id = Self::peer_id(name);
        let position = self
            .peers
            .iter()
            .position(|peer| *peer.local_peer_id() == peer_id)?;
        Some(self.peers.remove(position))
    }

    pub fn peer_id(name: &str) -> PeerId {
        PeerId::from(format!("p-{}", name))
    }

    pub fn peer(&self, name: &str) -> &Peer<LocalTransport> {
        let peer_id = Self::peer_id(name);
        self.peers
            .iter()
            .find(|peer| *peer.local_peer_id() == peer_id)
            .unwrap_or_else(|| panic!("no peer named {}", name))
    }

    pub fn peer_mut(&mut self, name: &str) -> &mut Peer<LocalTransport> {
        let peer_id = Self::peer_id(name);
        self.peers
            .iter_mut()
            .find(|peer| *peer.local_peer_id() == peer_id)
            .unwrap_or_else(|| panic!("no peer named {}", name))
    }

    pub fn connect(&mut self, from: &str, to: &str) {
        let target = Self::peer_id(to);
        self.peer_mut(from)
            .connect(&target)
            .unwrap_or_else(|error| panic!("{} could not connect to {}: {}", from, to, error));
    }

    /// Links every pair of peers and lets the snapshots settle
    pub fn connect_all(&mut self) {
        let names: Vec<String> = self
            .peers
            .iter()
            .map(|peer| peer.local_peer_id().as_str().trim_start_matches("p-").to_string())
            .collect();
        for (position, from) in names.iter().enumerate() {
            for to in names.iter().skip(position + 1) {
                self.connect(from, to);
            }
        }
        self.settle();
    }

    /// One update for every peer, in insertion order
    pub fn update(&mut self) {
        for peer in self.peers.iter_mut() {
            peer.update();
        }
    }

    pub fn settle(&mut self) {
        for _ in 0..ROUNDS_TO_SETTLE {
            self.update();
        }
    }

    /// Moves the shared clock forward, then settles
    pub fn advance(&mut self, duration: Duration) {
        self.clock.advance(duration);
        self.settle();
    }
}

impl Default for TestCluster {
    fn default() -> Self {
        Self::new()
    }
}

/// Name of the cursor that `observer` holds for `user`, if any
pub fn cursor_name(observer: &Peer<LocalTransport>, user: &str) -> Option<String> {
    observer
        .presence()
        .find_by_user_id(&UserId::from(user))
        .map(|cursor| cursor.borrow().name())
}
