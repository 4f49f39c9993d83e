//! Well-known topic names and their payload shapes

use serde::{Deserialize, Serialize};

use crate::{EntityId, EventError, PeerId};

/// Local: an object became reachable through the registry
pub const ADD_GAME_OBJECT: &str = "ADD_GAME_OBJECT";
/// Local: an object left the registry
pub const DELETE_GAME_OBJECT: &str = "DELETE_GAME_OBJECT";
/// Network: carries a full [`SyncContext`](crate::SyncContext)
pub const UPDATE_GAME_OBJECT: &str = "UPDATE_GAME_OBJECT";
/// Network: carries identifiers destroyed by their owner
pub const DESTROY_GAME_OBJECT: &str = "DESTROY_GAME_OBJECT";
/// Local: a peer joined the roster
pub const PEER_CONNECTED: &str = "PEER_CONNECTED";
/// Local: a peer left the roster
pub const DISCONNECT_PEER: &str = "DISCONNECT_PEER";
/// Local: a chat message was added to a tab
pub const MESSAGE_ADDED: &str = "MESSAGE_ADDED";
/// Network: someone is composing a message in a tab
pub const WRITING_A_MESSAGE: &str = "WRITING_A_MESSAGE";

/// Topic names are non-empty and whitespace free
pub fn validate_topic(topic: &str) -> Result<(), EventError> {
    if topic.is_empty() {
        return Err(EventError::EmptyTopic);
    }
    if topic.chars().any(char::is_whitespace) {
        return Err(EventError::MalformedTopic {
            topic: topic.to_string(),
        });
    }
    Ok(())
}

/// Payload of `ADD_GAME_OBJECT` / `DELETE_GAME_OBJECT`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectEventPayload {
    pub identifier: EntityId,
    pub alias_name: String,
}

/// Payload of `PEER_CONNECTED` / `DISCONNECT_PEER`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerEventPayload {
    pub peer_id: PeerId,
}

/// Payload of `DESTROY_GAME_OBJECT`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestroyPayload {
    pub identifiers: Vec<EntityId>,
}

/// Payload of `MESSAGE_ADDED`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAddedPayload {
    pub tab_identifier: EntityId,
    pub message_identifier: EntityId,
}
