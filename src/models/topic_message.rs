use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::{QueueLinkError, Result};

use super::topic::Topic;

/// Decoded body of a push event.
///
/// Bodies are assumed to be JSON; a body that fails to parse is passed
/// through raw rather than dropped, so subscribers always see every message
/// delivered on their topic.
#[derive(Debug, Clone, PartialEq)]
pub enum TopicPayload {
    /// The body parsed as JSON.
    Json(JsonValue),
    /// The body as received, when JSON parsing failed.
    Raw(String),
}

impl TopicPayload {
    /// Parse a wire body, falling back to raw passthrough.
    pub(crate) fn parse(body: String) -> Self {
        match serde_json::from_str::<JsonValue>(&body) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Raw(body),
        }
    }

    /// The parsed JSON value, if the body was well-formed.
    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            Self::Json(value) => Some(value),
            Self::Raw(_) => None,
        }
    }

    /// The raw body, if JSON parsing failed.
    pub fn as_raw(&self) -> Option<&str> {
        match self {
            Self::Json(_) => None,
            Self::Raw(body) => Some(body),
        }
    }
}

/// One push event as delivered to a subscription handler.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicMessage {
    /// The topic the event arrived on.
    pub topic: Topic,
    /// The decoded (or raw) body.
    pub payload: TopicPayload,
}

impl TopicMessage {
    /// Decode the payload into a typed DTO.
    ///
    /// Fails with a decode error when the body did not parse as JSON or does
    /// not match `T`. Most consumers never need this: pushes are
    /// invalidation hints, and the refreshed pull carries the state.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        match &self.payload {
            TopicPayload::Json(value) => serde_json::from_value(value.clone()).map_err(|e| {
                QueueLinkError::DecodeError(format!(
                    "Payload on {} does not match expected type: {}",
                    self.topic, e
                ))
            }),
            TopicPayload::Raw(body) => Err(QueueLinkError::DecodeError(format!(
                "Payload on {} is not JSON (raw body {} bytes)",
                self.topic,
                body.len()
            ))),
        }
    }
}
