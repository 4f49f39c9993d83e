pub use tabletop_shared::{
    LocalHub, LocalTransport, Roster, Transport, TransportError, TransportEvent, WireMessage,
};

cfg_if! {
    if #[cfg(feature = "transport_tcp")] {
        pub mod tcp;
    } else {}
}
