use thiserror::Error;

/// Errors that can occur during transport operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No open link to the peer
    #[error("Not connected to peer {peer_id}")]
    NotConnected { peer_id: String },

    /// Peer is not reachable on this transport
    #[error("Peer {peer_id} is unknown to this transport")]
    UnknownPeer { peer_id: String },

    /// A peer cannot link to itself
    #[error("Peer {peer_id} attempted to connect to itself")]
    SelfConnect { peer_id: String },

    /// Another endpoint already uses this peer id
    #[error("Peer id {peer_id} is already in use")]
    PeerIdTaken { peer_id: String },

    /// Outgoing frame could not be serialized
    #[error("Failed to encode frame: {reason}")]
    Encode { reason: String },

    /// Incoming frame was not a valid message
    #[error("Failed to decode frame: {reason}")]
    Decode { reason: String },

    /// Underlying socket failure
    #[error("Transport I/O error: {reason}")]
    Io { reason: String },

    /// Frame exceeds the maximum accepted length
    #[error("Frame of {length} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { length: usize, limit: usize },
}
