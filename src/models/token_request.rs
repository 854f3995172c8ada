use serde::{Deserialize, Serialize};

/// Body for booking a new token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub user_id: i64,
    pub department_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctor_id: Option<i64>,
    /// Higher values jump the queue; normal bookings are 0.
    #[serde(default)]
    pub priority: i32,
}

impl TokenRequest {
    /// A normal-priority booking for a user in a department.
    pub fn new(user_id: i64, department_id: i64) -> Self {
        Self {
            user_id,
            department_id,
            doctor_id: None,
            priority: 0,
        }
    }

    /// Attach a preferred doctor.
    pub fn with_doctor(mut self, doctor_id: i64) -> Self {
        self.doctor_id = Some(doctor_id);
        self
    }

    /// Override the booking priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}
