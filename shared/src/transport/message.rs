use serde::{Deserialize, Serialize};

use crate::{NetworkEvent, PeerId, TransportError};

/// One frame on the wire. JSON text, tagged by `type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WireMessage {
    /// First frame on a stream link, names the sender
    Hello {
        #[serde(rename = "peerId")]
        peer_id: PeerId,
    },
    Event(NetworkEvent),
}

impl WireMessage {
    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        serde_json::to_vec(self).map_err(|error| TransportError::Encode {
            reason: error.to_string(),
        })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TransportError> {
        serde_json::from_slice(bytes).map_err(|error| TransportError::Decode {
            reason: error.to_string(),
        })
    }
}
