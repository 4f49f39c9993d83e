use std::cell::Cell;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::PeerId;

/// An event as seen by handlers
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub event_name: String,
    pub data: Value,
    pub send_from: PeerId,
    /// True when this peer emitted the event, for echo suppression
    pub is_send_from_self: bool,
    propagation_stopped: Cell<bool>,
}

impl Event {
    pub fn new(event_name: String, data: Value, send_from: PeerId, is_send_from_self: bool) -> Self {
        Self {
            event_name,
            data,
            send_from,
            is_send_from_self,
            propagation_stopped: Cell::new(false),
        }
    }

    /// Handlers registered after the current one will not see this event
    pub fn stop_propagation(&self) {
        self.propagation_stopped.set(true);
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped.get()
    }

    /// Decodes the payload, `None` if it does not have the expected shape
    pub fn data_as<T: DeserializeOwned>(&self) -> Option<T> {
        T::deserialize(&self.data).ok()
    }
}

/// An event as it crosses the wire
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEvent {
    pub event_name: String,
    #[serde(default)]
    pub data: Value,
    pub send_from: PeerId,
}

/// A network event waiting in the bus outbox. `target: None` broadcasts to
/// the whole roster.
#[derive(Clone, Debug, PartialEq)]
pub struct OutgoingEvent {
    pub target: Option<PeerId>,
    pub event: NetworkEvent,
}
