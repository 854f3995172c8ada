//! Typed payloads for the notification-style push topics.
//!
//! These mirror what the server broadcasts on the per-user and secondary
//! per-department destinations. All are optional conveniences for
//! [`TopicMessage::decode`](crate::TopicMessage::decode); the
//! synchronization layer itself treats every push as an invalidation hint
//! and never reads these fields to build queue state.

use serde::{Deserialize, Serialize};

use super::token::TokenStatus;

/// Personal notification delivered on `/queue/user/{id}/notifications`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserNotification {
    pub message: String,
    /// Notification category tag, e.g. `INFO` or `CALL`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Millis since the Unix epoch.
    pub timestamp: u64,
}

/// "Your turn" notice delivered on `/queue/user/{id}/call`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallNotification {
    pub token_number: String,
    pub department_name: String,
    pub message: String,
    pub timestamp: u64,
}

/// Status transition notice on `/topic/queue/{id}/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub token_id: i64,
    pub old_status: TokenStatus,
    pub new_status: TokenStatus,
    pub timestamp: u64,
}

/// Cancellation notice on `/topic/queue/{id}/cancelled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenCancellation {
    pub token_id: i64,
    pub token_number: String,
    pub timestamp: u64,
}

/// Estimated-wait update on `/topic/queue/{id}/waittime`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitTimeUpdate {
    /// Estimated minutes until a new booking would be served.
    pub estimated_wait_time: i32,
    pub queue_length: i32,
    pub timestamp: u64,
}

/// Operational alert on `/topic/admin/alerts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAlert {
    pub message: String,
    /// Severity tag, e.g. `INFO`, `WARNING`, `CRITICAL`.
    pub severity: String,
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_notification_maps_type_field() {
        let json = r#"{"message":"Almost there","type":"INFO","timestamp":1710406800000}"#;
        let notification: UserNotification = serde_json::from_str(json).unwrap();
        assert_eq!(notification.kind, "INFO");
        assert_eq!(notification.timestamp, 1_710_406_800_000);
    }

    #[test]
    fn status_change_carries_both_statuses() {
        let json = r#"{
            "tokenId": 12,
            "oldStatus": "WAITING",
            "newStatus": "IN_PROGRESS",
            "timestamp": 1710406800000
        }"#;
        let change: StatusChange = serde_json::from_str(json).unwrap();
        assert_eq!(change.old_status, TokenStatus::Waiting);
        assert_eq!(change.new_status, TokenStatus::InProgress);
        assert!(change.old_status.can_transition_to(&change.new_status));
    }

    #[test]
    fn call_notification_parses() {
        let json = r#"{
            "tokenNumber": "CARD-017",
            "departmentName": "Cardiology",
            "message": "Your turn! Please proceed to Cardiology",
            "timestamp": 1710406800000
        }"#;
        let call: CallNotification = serde_json::from_str(json).unwrap();
        assert_eq!(call.token_number, "CARD-017");
    }
}
