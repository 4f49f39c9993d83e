//! # Tabletop Peer
//! A participant of a shared tabletop session: keeps a replica of the
//! table's objects in sync with the other peers over a pluggable transport,
//! and hosts the characters, chat tabs and presence built on top of it.

#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces
)]

#[macro_use]
extern crate cfg_if;

pub mod objects;
pub mod transport;
pub mod shared {
    pub use tabletop_shared::{
        topics, Clock, EntityId, EntityRef, Event, EventBus, ManualClock, NetworkEvent,
        ObjectRegistry, PeerCursor, PeerId, PresenceConfig, PresenceManager, PropertyValue,
        Replicate, ReplicateBuilder, Scheduler, SyncContext, SystemClock, TypedRef, UserId,
    };
}

mod chat_service;
mod error;
mod peer;
mod peer_config;
mod writing_indicator;

pub use chat_service::{ChatService, MessageOptions};
pub use error::PeerError;
pub use peer::Peer;
pub use peer_config::{ChatConfig, PeerConfig};
pub use writing_indicator::{Writer, WritingIndicator};
