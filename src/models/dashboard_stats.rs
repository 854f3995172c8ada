use serde::{Deserialize, Serialize};

/// Daily aggregate statistics for one department's dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_tokens_today: i64,
    pub completed_tokens: i64,
    pub waiting_tokens: i64,
    pub cancelled_tokens: i64,
    #[serde(default)]
    pub average_wait_time: Option<f64>,
    #[serde(default)]
    pub current_queue_length: Option<i32>,
}
