//! Error types for queue-link operations.

use thiserror::Error;

/// Convenience result alias used across the crate.
pub type Result<T> = std::result::Result<T, QueueLinkError>;

/// Errors surfaced by the synchronization layer.
///
/// Transport-level failures are contained by the reconnection supervisor and
/// arrive here only through bounded operations (`connect`, `subscribe`,
/// `publish`) or the pull API. None of these variants ever disables the
/// layer; every failure mode has either an automatic retry or an explicit
/// no-op behind it.
#[derive(Error, Debug)]
pub enum QueueLinkError {
    /// WebSocket handshake or protocol failure, including handshake timeout.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Operation attempted while not in the `Connected` state.
    #[error("Not connected to the event channel")]
    NotConnectedError,

    /// A payload could not be decoded into the requested type.
    ///
    /// Inbound push bodies never produce this during delivery; an
    /// undecodable body is passed through raw instead. This variant comes
    /// from explicit typed decoding (`TopicMessage::decode`) and from pull
    /// API response bodies.
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// A pull API request failed (non-success HTTP status or I/O error).
    #[error("Pull request failed: {0}")]
    PullError(String),

    /// The pull API rejected the credentials (HTTP 401/403).
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// An operation exceeded its configured timeout.
    #[error("Timeout: {0}")]
    TimeoutError(String),

    /// Invalid client configuration (missing base URL, bad topic path, ...).
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Internal invariant violation (connection task gone, channel closed).
    #[error("Internal error: {0}")]
    InternalError(String),
}
