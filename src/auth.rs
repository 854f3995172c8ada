//! Bearer-token supply for pull API requests.
//!
//! Credential acquisition, storage, and the redirect-on-401 flow all live in
//! the embedding application. This module only answers one question: what, if
//! anything, goes into the `Authorization` header of a pull request.

use serde::{Deserialize, Serialize};

/// Source of the bearer token attached to pull API requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AuthProvider {
    /// No `Authorization` header is sent.
    #[default]
    None,

    /// A static bearer token, typically sourced from the app's session store.
    Bearer { token: String },
}

impl AuthProvider {
    /// Build a bearer-token provider.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }

    /// The `Authorization` header value, if any.
    pub fn header_value(&self) -> Option<String> {
        match self {
            Self::None => None,
            Self::Bearer { token } => Some(format!("Bearer {}", token)),
        }
    }
}
