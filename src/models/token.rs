use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a [`Token`].
///
/// `WAITING → IN_PROGRESS → COMPLETED`, with administrative cancellation out
/// of `WAITING` or `IN_PROGRESS`. `COMPLETED` and `CANCELLED` are terminal.
/// The server is authoritative; the client interprets transitions
/// structurally so every surface renders them the same way.
///
/// Wire values outside the known set deserialize to [`TokenStatus::Other`]
/// with the raw string preserved, so a server-side addition never breaks
/// decoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TokenStatus {
    /// Booked, waiting to be called.
    Waiting,

    /// Currently being served.
    InProgress,

    /// Service finished. Terminal.
    Completed,

    /// Withdrawn by the patient or an administrator. Terminal.
    Cancelled,

    /// Unrecognized status value, preserved verbatim.
    Other(String),
}

impl TokenStatus {
    /// The status every freshly booked token starts in.
    pub fn initial() -> Self {
        Self::Waiting
    }

    /// The wire representation of this status.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Waiting => "WAITING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Other(raw) => raw,
        }
    }

    /// Whether no further transitions can occur from this status.
    ///
    /// Unknown statuses are not treated as terminal; the safety-net pull
    /// will keep refreshing them until the server reports a known state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether a token in this status still occupies the queue.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Waiting | Self::InProgress)
    }

    /// Whether the server-side state machine permits moving to `next`.
    ///
    /// Self-transitions are not transitions, and nothing can be validated
    /// about unknown statuses on either side.
    pub fn can_transition_to(&self, next: &TokenStatus) -> bool {
        match (self, next) {
            (Self::Waiting, Self::InProgress) | (Self::Waiting, Self::Cancelled) => true,
            (Self::InProgress, Self::Completed) | (Self::InProgress, Self::Cancelled) => true,
            _ => false,
        }
    }
}

impl From<String> for TokenStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "WAITING" => Self::Waiting,
            "IN_PROGRESS" => Self::InProgress,
            "COMPLETED" => Self::Completed,
            "CANCELLED" => Self::Cancelled,
            _ => Self::Other(value),
        }
    }
}

impl From<TokenStatus> for String {
    fn from(value: TokenStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A patient's queue entry as pulled or pushed from the server.
///
/// The server owns this data; the client holds a read-only, eventually
/// consistent copy that is rebuilt wholesale on every pull. Timestamps are
/// ISO-8601 strings passed through for display; the client never computes
/// on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: i64,
    pub token_number: String,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub patient_name: Option<String>,
    pub department_id: i64,
    #[serde(default)]
    pub department_name: Option<String>,
    pub status: TokenStatus,
    #[serde(default)]
    pub booking_time: Option<String>,
    /// Estimated minutes until service starts.
    #[serde(default)]
    pub estimated_wait_time: Option<i32>,
    /// Zero-based position among active tokens; the token being served is 0.
    #[serde(default)]
    pub queue_position: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_end_time: Option<String>,
}
