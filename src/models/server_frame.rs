use serde::{Deserialize, Serialize};

/// Server-to-client wire frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Acknowledges a `connect` frame; the channel is now usable.
    Connected,

    /// A push event on a subscribed topic.
    Message {
        /// Topic path the event was published on.
        topic: String,
        /// Payload body; opaque to the framing layer, decoded above it.
        body: String,
    },

    /// A server-side error notice. Informational; the connection stays up
    /// unless the server also closes it.
    Error {
        /// Human-readable error message.
        message: String,
    },
}
