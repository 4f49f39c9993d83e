pub mod error;
pub mod event;
pub mod event_bus;
pub mod topics;
