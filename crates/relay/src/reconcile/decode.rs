use serde_json::{Map, Value};
use thiserror::Error;
use worksync_common::protocol::sync::FileUpdatePayload;

use super::ChangeNotification;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid data format")]
    InvalidJson(#[source] serde_json::Error),
    #[error("Invalid data format")]
    UnsupportedShape,
}

/// A `file:update` payload as it arrives on the wire: either a JSON document
/// serialized into a string, or an already structured object.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    Serialized(String),
    Structured(Map<String, Value>),
}

impl RawPayload {
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::String(raw) => Ok(Self::Serialized(raw)),
            Value::Object(map) => Ok(Self::Structured(map)),
            _ => Err(DecodeError::UnsupportedShape),
        }
    }

    pub fn decode(self) -> Result<ChangeNotification, DecodeError> {
        match self {
            Self::Serialized(raw) => decode_serialized(&raw),
            Self::Structured(map) => Ok(decode_structured(&map)),
        }
    }
}

/// Strict: the string must hold a JSON object matching the payload schema.
fn decode_serialized(raw: &str) -> Result<ChangeNotification, DecodeError> {
    serde_json::from_str::<FileUpdatePayload>(raw)
        .map(ChangeNotification::from)
        .map_err(DecodeError::InvalidJson)
}

/// Lenient: copies each field whose type matches and skips the rest.
fn decode_structured(map: &Map<String, Value>) -> ChangeNotification {
    let text = |key: &str| map.get(key).and_then(Value::as_str).unwrap_or_default().to_owned();
    let timestamp = map
        .get("timestamp")
        .and_then(|value| value.as_i64().or_else(|| value.as_f64().map(|v| v as i64)))
        .unwrap_or_default();

    ChangeNotification {
        id: text("id"),
        file_path: text("filePath"),
        content_hash: text("hash"),
        previous_hash: text("previousHash"),
        event_kind: text("event"),
        content: text("content"),
        timestamp,
        credential: text("apiKey"),
        workspace_root: text("workspacePath"),
    }
}
