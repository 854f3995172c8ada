use serde::{Deserialize, Serialize};

/// A hospital department, as returned by the department endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: i64,
    pub hospital_id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Average minutes to serve one token, used for wait estimates.
    #[serde(default)]
    pub average_service_time: Option<i32>,
}
