//! Timeout configuration for queue-link operations.
//!
//! Centralizes every bounded wait in the crate: connection establishment,
//! the connect-acknowledgement handshake, subscribe state-waits, outbound
//! sends, pull requests, and the keepalive machinery.

use std::time::Duration;

/// Timeout configuration for queue-link operations.
///
/// All values have sensible defaults; zero disables a timeout where noted.
///
/// # Examples
///
/// ```rust
/// use queue_link::QueueLinkTimeouts;
/// use std::time::Duration;
///
/// // Defaults (recommended for most deployments)
/// let timeouts = QueueLinkTimeouts::default();
///
/// // Custom values for high-latency links
/// let timeouts = QueueLinkTimeouts::builder()
///     .connect_timeout(Duration::from_secs(30))
///     .pull_timeout(Duration::from_secs(60))
///     .build();
///
/// // Aggressive values for local development
/// let timeouts = QueueLinkTimeouts::fast();
/// ```
#[derive(Debug, Clone)]
pub struct QueueLinkTimeouts {
    /// Timeout for establishing the WebSocket (TCP + TLS + upgrade).
    /// Default: 10 seconds
    pub connect_timeout: Duration,

    /// Timeout for the connect-acknowledgement after the socket is open.
    /// The reference behavior had no bound here; expiry is reported as a
    /// transport error while the supervisor keeps retrying.
    /// Default: 5 seconds
    pub handshake_timeout: Duration,

    /// Maximum time `subscribe` waits for the `Connected` state before
    /// giving up. Replaces the retry-after-one-second polling of the
    /// reference behavior with a bounded state-wait.
    /// Default: 15 seconds
    pub subscribe_wait: Duration,

    /// Timeout for writing an outbound frame (publish, subscribe frames).
    /// Default: 10 seconds
    pub send_timeout: Duration,

    /// Total timeout for one pull API request.
    /// Default: 30 seconds
    pub pull_timeout: Duration,

    /// Keepalive ping interval for the WebSocket connection.
    /// Set to 0 to disable keepalive pings.
    /// Default: 10 seconds
    pub keepalive_interval: Duration,

    /// Maximum wait for a Pong (or any frame) after a keepalive Ping before
    /// the connection is considered dead and torn down for reconnection.
    /// Set to 0 to disable pong timeout checking.
    /// Default: 5 seconds
    pub pong_timeout: Duration,
}

impl Default for QueueLinkTimeouts {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(5),
            subscribe_wait: Duration::from_secs(15),
            send_timeout: Duration::from_secs(10),
            pull_timeout: Duration::from_secs(30),
            keepalive_interval: Duration::from_secs(10),
            pong_timeout: Duration::from_secs(5),
        }
    }
}

impl QueueLinkTimeouts {
    /// Create a new builder for custom timeout configuration.
    pub fn builder() -> QueueLinkTimeoutsBuilder {
        QueueLinkTimeoutsBuilder::new()
    }

    /// Timeouts optimized for fast local development.
    pub fn fast() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            handshake_timeout: Duration::from_secs(2),
            subscribe_wait: Duration::from_secs(3),
            send_timeout: Duration::from_secs(2),
            pull_timeout: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(15),
            pong_timeout: Duration::from_secs(5),
        }
    }

    /// Timeouts optimized for high-latency or unreliable networks.
    pub fn relaxed() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(15),
            subscribe_wait: Duration::from_secs(60),
            send_timeout: Duration::from_secs(30),
            pull_timeout: Duration::from_secs(120),
            keepalive_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
        }
    }

    /// Short timeouts suitable for integration tests, so a failing wait
    /// surfaces quickly instead of stalling the suite.
    pub fn for_testing() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(3),
            subscribe_wait: Duration::from_secs(3),
            send_timeout: Duration::from_secs(5),
            pull_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(5),
            pong_timeout: Duration::from_secs(3),
        }
    }

    /// Check whether a duration represents "no timeout" (zero or very large).
    pub fn is_no_timeout(duration: Duration) -> bool {
        duration.is_zero() || duration > Duration::from_secs(86400 * 365)
    }
}

/// Builder for custom [`QueueLinkTimeouts`] configurations.
#[derive(Debug, Clone)]
pub struct QueueLinkTimeoutsBuilder {
    timeouts: QueueLinkTimeouts,
}

impl QueueLinkTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: QueueLinkTimeouts::default(),
        }
    }

    /// Set the WebSocket establishment timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connect_timeout = timeout;
        self
    }

    /// Set the WebSocket establishment timeout in seconds.
    pub fn connect_timeout_secs(self, secs: u64) -> Self {
        self.connect_timeout(Duration::from_secs(secs))
    }

    /// Set the connect-acknowledgement timeout.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.handshake_timeout = timeout;
        self
    }

    /// Set the connect-acknowledgement timeout in seconds.
    pub fn handshake_timeout_secs(self, secs: u64) -> Self {
        self.handshake_timeout(Duration::from_secs(secs))
    }

    /// Set the maximum wait for the `Connected` state inside `subscribe`.
    pub fn subscribe_wait(mut self, timeout: Duration) -> Self {
        self.timeouts.subscribe_wait = timeout;
        self
    }

    /// Set the subscribe state-wait in seconds.
    pub fn subscribe_wait_secs(self, secs: u64) -> Self {
        self.subscribe_wait(Duration::from_secs(secs))
    }

    /// Set the outbound frame send timeout.
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.send_timeout = timeout;
        self
    }

    /// Set the outbound frame send timeout in seconds.
    pub fn send_timeout_secs(self, secs: u64) -> Self {
        self.send_timeout(Duration::from_secs(secs))
    }

    /// Set the total pull request timeout.
    pub fn pull_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.pull_timeout = timeout;
        self
    }

    /// Set the total pull request timeout in seconds.
    pub fn pull_timeout_secs(self, secs: u64) -> Self {
        self.pull_timeout(Duration::from_secs(secs))
    }

    /// Set the keepalive ping interval. Zero disables keepalive pings.
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.timeouts.keepalive_interval = interval;
        self
    }

    /// Set the keepalive ping interval in seconds. Zero disables.
    pub fn keepalive_interval_secs(self, secs: u64) -> Self {
        self.keepalive_interval(Duration::from_secs(secs))
    }

    /// Set the pong timeout. Zero disables pong timeout checking.
    pub fn pong_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.pong_timeout = timeout;
        self
    }

    /// Set the pong timeout in seconds. Zero disables.
    pub fn pong_timeout_secs(self, secs: u64) -> Self {
        self.pong_timeout(Duration::from_secs(secs))
    }

    /// Build the timeout configuration.
    pub fn build(self) -> QueueLinkTimeouts {
        self.timeouts
    }
}
