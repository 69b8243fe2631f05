// Payload shapes carried inside event frames (camelCase on the wire).

use serde::{Deserialize, Deserializer, Serialize};

/// Body of a `file:update` event as sent by editor clients.
///
/// Every field defaults to its zero value so partially filled payloads still
/// decode. Explicit `null` counts as absent; a value of the wrong type is
/// still rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct FileUpdatePayload {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub file_path: String,
    #[serde(deserialize_with = "null_as_default")]
    pub hash: String,
    #[serde(deserialize_with = "null_as_default")]
    pub event: String,
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub previous_hash: String,
    #[serde(deserialize_with = "null_as_default")]
    pub timestamp: i64,
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub api_key: String,
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub workspace_path: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    Received,
    Success,
    Error,
}

impl AckStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// Direct reply to a `file:update` (or any event that fails validation).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AckResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub status: AckStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl AckResponse {
    pub fn received(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            status: AckStatus::Received,
            message: "File update received, processing...".to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { id: None, status: AckStatus::Error, message: message.into() }
    }
}

/// Payload of the `file:update:ack` event emitted once reconciliation ends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FinalResult {
    pub id: String,
    pub status: AckStatus,
    pub message: String,
    pub file: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct PingPayload {
    #[serde(deserialize_with = "null_as_default")]
    pub timestamp: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(deserialize_with = "null_as_default")]
    pub socket_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PongPayload {
    pub timestamp: i64,
    pub server_time: String,
    pub message: String,
    pub received_ping: PingPayload,
    pub socket_id: String,
    pub server_status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct HeartbeatPayload {
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(deserialize_with = "null_as_default")]
    pub timestamp: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub client_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatAck {
    pub status: String,
    pub server_time: i64,
    pub socket_id: String,
}

/// `server:status` broadcasts and informational acks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusMessage {
    pub status: String,
    pub message: String,
}

impl StatusMessage {
    pub fn new(status: impl Into<String>, message: impl Into<String>) -> Self {
        Self { status: status.into(), message: message.into() }
    }
}

/// Maps JSON `null` to the type's zero value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
