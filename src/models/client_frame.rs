use serde::{Deserialize, Serialize};

/// Client-to-server wire frames.
///
/// Every frame is a tagged JSON text message. `Connect` must be the first
/// frame on a fresh socket; the server answers with `connected` before any
/// other traffic flows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Open the logical channel. Sent once per socket, immediately after
    /// the WebSocket upgrade.
    Connect,

    /// Register interest in a topic.
    Subscribe {
        /// Topic path to subscribe to.
        topic: String,
    },

    /// Withdraw interest in a topic.
    Unsubscribe {
        /// Topic path to unsubscribe from.
        topic: String,
    },

    /// Publish a payload to a topic.
    Send {
        /// Destination topic path.
        topic: String,
        /// Serialized payload; opaque to the framing layer.
        body: String,
    },
}
