// Event-frame envelope for the worksync socket.
//
// Every WebSocket text message is one frame. Clients send named events with a
// positional payload and an optional ack id; the server answers either with a
// named event or with an ack frame echoing the client's ack id.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const EVENT_DISCONNECT: &str = "disconnect";
pub const EVENT_FILE_UPDATE: &str = "file:update";
pub const EVENT_FILE_UPDATE_ACK: &str = "file:update:ack";
pub const EVENT_TEST_PING: &str = "test:ping";
pub const EVENT_TEST_PONG: &str = "test:pong";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_WORKSPACE_STATS: &str = "workspace:stats";
pub const EVENT_SERVER_STATUS: &str = "server:status";

/// Client-originated channels the server binds on every connection.
pub const INBOUND_EVENTS: &[&str] = &[
    EVENT_DISCONNECT,
    EVENT_FILE_UPDATE,
    EVENT_TEST_PING,
    EVENT_HEARTBEAT,
    EVENT_WORKSPACE_STATS,
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Bidirectional: a named event with positional payload.
    Event {
        event: String,
        #[serde(default)]
        data: Vec<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ack_id: Option<u64>,
    },

    /// Server -> Client: direct reply to an event that carried `ack_id`.
    Ack { ack_id: u64, data: Vec<Value> },
}

impl Frame {
    pub fn event(event: impl Into<String>, payload: Value) -> Self {
        Self::Event { event: event.into(), data: vec![payload], ack_id: None }
    }

    pub fn ack(ack_id: u64, payload: Value) -> Self {
        Self::Ack { ack_id, data: vec![payload] }
    }
}

pub fn decode_frame(raw: &str) -> Result<Frame, serde_json::Error> {
    serde_json::from_str::<Frame>(raw)
}

pub fn encode_frame(frame: &Frame) -> Result<String, serde_json::Error> {
    serde_json::to_string(frame)
}
