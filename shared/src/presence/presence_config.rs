use std::{default::Default, time::Duration};

/// Contains Config properties which will be used by the PresenceManager
#[derive(Clone, Debug)]
pub struct PresenceConfig {
    /// How long a disconnected peer's cursor stays on the table before it
    /// is removed. A reconnect with the same peer id inside this window
    /// cancels the removal.
    pub grace_period: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(30),
        }
    }
}
