use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{QueueLinkError, Result};

/// A named push channel, identified by a hierarchical path.
///
/// Broadcast topics live under `/topic/...`; per-user point-to-point
/// destinations live under `/queue/user/...`. The constructors cover every
/// destination the server broadcasts on; [`Topic::new`] accepts any valid
/// path for forward compatibility.
///
/// ```rust
/// use queue_link::Topic;
///
/// assert_eq!(Topic::department_queue(3).as_str(), "/topic/queue/3");
/// assert_eq!(Topic::user_calls(7).as_str(), "/queue/user/7/call");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    /// Create a topic from an arbitrary path.
    ///
    /// The path must be non-empty, start with `/`, and contain no whitespace.
    pub fn new(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        if path.is_empty() {
            return Err(QueueLinkError::ConfigurationError(
                "Topic path cannot be empty".to_string(),
            ));
        }
        if !path.starts_with('/') {
            return Err(QueueLinkError::ConfigurationError(format!(
                "Topic path must start with '/': {}",
                path
            )));
        }
        if path.chars().any(char::is_whitespace) {
            return Err(QueueLinkError::ConfigurationError(format!(
                "Topic path cannot contain whitespace: {}",
                path
            )));
        }
        Ok(Self(path))
    }

    /// All token updates for one department's queue.
    pub fn department_queue(department_id: i64) -> Self {
        Self(format!("/topic/queue/{}", department_id))
    }

    /// Status-change notices (old status → new status) for one department.
    pub fn queue_status(department_id: i64) -> Self {
        Self(format!("/topic/queue/{}/status", department_id))
    }

    /// Newly created tokens in one department.
    pub fn queue_new_tokens(department_id: i64) -> Self {
        Self(format!("/topic/queue/{}/new", department_id))
    }

    /// Cancellation notices for one department.
    pub fn queue_cancellations(department_id: i64) -> Self {
        Self(format!("/topic/queue/{}/cancelled", department_id))
    }

    /// Estimated-wait-time updates for one department.
    pub fn queue_wait_times(department_id: i64) -> Self {
        Self(format!("/topic/queue/{}/waittime", department_id))
    }

    /// Aggregate statistics updates for one department.
    pub fn department_stats(department_id: i64) -> Self {
        Self(format!("/topic/queue/{}/stats", department_id))
    }

    /// Lobby display updates for one department's screens.
    pub fn live_display(department_id: i64) -> Self {
        Self(format!("/topic/display/{}", department_id))
    }

    /// Operational alerts for administrator consoles.
    pub fn admin_alerts() -> Self {
        Self("/topic/admin/alerts".to_string())
    }

    /// Personal notifications for one user.
    pub fn user_notifications(user_id: i64) -> Self {
        Self(format!("/queue/user/{}/notifications", user_id))
    }

    /// "Your turn" call notices for one user.
    pub fn user_calls(user_id: i64) -> Self {
        Self(format!("/queue/user/{}/call", user_id))
    }

    /// The topic path.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
