use thiserror::Error;

/// Errors that can occur during event bus operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// Topic name is empty
    #[error("Event topic must not be empty")]
    EmptyTopic,

    /// Topic name contains whitespace
    #[error("Event topic '{topic}' must not contain whitespace")]
    MalformedTopic { topic: String },

    /// Event payload could not be encoded
    #[error("Payload for topic '{topic}' could not be encoded: {reason}")]
    PayloadEncoding { topic: String, reason: String },
}
