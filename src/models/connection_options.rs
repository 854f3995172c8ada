use serde::{Deserialize, Serialize};

/// Connection-level options for the shared event channel.
///
/// These control reconnection pacing and channel plumbing. Separate from
/// [`QueueLinkTimeouts`](crate::QueueLinkTimeouts), which bounds individual
/// operations.
///
/// # Example
///
/// ```rust
/// use queue_link::ConnectionOptions;
///
/// let options = ConnectionOptions::default()
///     .with_reconnect_delay_ms(2000)
///     .with_ws_path("/realtime");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Fixed delay in milliseconds between reconnection attempts.
    ///
    /// The supervisor retries at this constant cadence, with no attempt
    /// cap, until `disconnect()` is called.
    /// Default: 5000 (5 seconds)
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Path of the WebSocket endpoint relative to the base URL.
    /// Default: "/ws"
    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// Capacity of each subscription handler's event channel.
    ///
    /// When one handler's channel fills up, further events to that handler
    /// are dropped while other handlers keep receiving; the periodic pull
    /// re-converges the lagging view.
    /// Default: 256
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_event_buffer() -> usize {
    256
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 5000,
            ws_path: "/ws".to_string(),
            event_buffer: 256,
        }
    }
}

impl ConnectionOptions {
    /// Create new connection options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fixed delay between reconnection attempts (in milliseconds).
    pub fn with_reconnect_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reconnect_delay_ms = delay_ms;
        self
    }

    /// Set the WebSocket endpoint path relative to the base URL.
    pub fn with_ws_path(mut self, path: impl Into<String>) -> Self {
        self.ws_path = path.into();
        self
    }

    /// Set the per-handler event channel capacity.
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }
}
