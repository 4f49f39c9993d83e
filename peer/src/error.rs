use thiserror::Error;

use tabletop_shared::{EventError, PropertyError, RegistryError, TransportError};

/// Errors surfaced by a [`Peer`](crate::Peer) and its collaborators
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Property(#[from] PropertyError),

    /// Chat tab is not in the registry
    #[error("Chat tab {identifier} not found")]
    TabNotFound { identifier: String },
}
