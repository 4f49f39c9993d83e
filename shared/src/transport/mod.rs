pub mod error;
pub mod local;
pub mod message;
pub mod roster;

use crate::{NetworkEvent, PeerId, Roster, TransportError};

/// What a transport reports when polled
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    Connected(PeerId),
    Disconnected(PeerId),
    Message(PeerId, NetworkEvent),
}

/// A point-to-point link layer between peers.
///
/// Implementations are polled: nothing is delivered until `receive` is
/// called, and the roster changes only as `Connected` / `Disconnected`
/// events are handed out.
pub trait Transport {
    fn local_peer_id(&self) -> &PeerId;

    /// Shared view of the peers this transport is linked to
    fn roster(&self) -> Roster;

    /// Opens a link. Both ends see `Connected` on their next poll.
    fn connect(&mut self, peer_id: &PeerId) -> Result<(), TransportError>;

    /// Closes a link if open. Both ends see `Disconnected`.
    fn disconnect(&mut self, peer_id: &PeerId);

    fn send(&mut self, peer_id: &PeerId, event: &NetworkEvent) -> Result<(), TransportError>;

    /// Next pending event, `None` when drained
    fn receive(&mut self) -> Option<TransportEvent>;
}
