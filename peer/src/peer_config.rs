use std::{default::Default, time::Duration};

use tabletop_shared::{PresenceConfig, UserId};

/// Timing of the chat collaborators
#[derive(Clone, Debug)]
pub struct ChatConfig {
    /// How long a "someone is writing" indicator stays up without a refresh
    pub writing_timeout: Duration,
    /// Minimum spacing between outgoing writing indicators from this peer
    pub writing_throttle: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            writing_timeout: Duration::from_secs(2),
            writing_throttle: Duration::from_millis(200),
        }
    }
}

/// Contains Config properties which will be used by a Peer
#[derive(Clone, Debug)]
pub struct PeerConfig {
    /// Stable identity of the participant, survives reconnects under a new
    /// peer id
    pub user_id: UserId,
    /// Grace period handling for participants that drop off
    pub presence: PresenceConfig,
    pub chat: ChatConfig,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            user_id: UserId::generate(),
            presence: PresenceConfig::default(),
            chat: ChatConfig::default(),
        }
    }
}
