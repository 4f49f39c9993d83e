pub mod entity_ref;
pub mod error;
pub mod mut_channel;
pub mod object_registry;
pub mod waitlist;
