//! # Tabletop Shared
//! The replication substrate shared by every tabletop peer: tracked objects,
//! the object registry, the event bus, the transport contract and peer
//! presence.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

pub mod events;
mod key_generator;
pub mod object;
pub mod presence;
pub mod registry;
pub mod sync;
pub mod timer;
pub mod transport;
mod types;

pub use events::{
    error::EventError,
    event::{Event, NetworkEvent, OutgoingEvent},
    event_bus::{EventBus, EventHandler, Registration},
    topics,
};
pub use key_generator::KeyGenerator;
pub use object::{
    diff_mask::DiffMask,
    error::{KindError, PropertyError},
    object_base::ObjectBase,
    object_kinds::{ObjectFactory, ObjectKinds},
    property::{Property, PropertyValue},
    property_mutate::{PropertyMutate, PropertyMutator},
    replicate::{AsAny, Replicate, ReplicateBuilder},
    schema::{ObjectSchema, PropertyDecl, PropertyDefault},
    sync_context::SyncContext,
};
pub use presence::{
    identity_index::IdentityIndex, peer_cursor::PeerCursor, presence_config::PresenceConfig,
    presence_manager::PresenceManager,
};
pub use registry::{
    entity_ref::{EntityRef, TypedRef},
    error::RegistryError,
    mut_channel::{MutChannel, MutSender},
    object_registry::{Detached, ObjectRegistry},
    waitlist::OrphanWaitlist,
};
pub use sync::object_synchronizer::ObjectSynchronizer;
pub use timer::{
    clock::{Clock, ManualClock, SystemClock},
    resettable_timeout::ResettableTimeout,
    scheduler::Scheduler,
};
pub use transport::{
    error::TransportError,
    local::{LocalHub, LocalTransport},
    message::WireMessage,
    roster::Roster,
    Transport, TransportEvent,
};
pub use types::{EntityId, PeerId, SubscriberKey, TimeoutKey, UserId};
