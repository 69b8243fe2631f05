// Connectivity probes. None of these touch the reconciler or the store.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use worksync_common::protocol::{
    frame::EVENT_TEST_PONG,
    sync::{AckResponse, HeartbeatAck, HeartbeatPayload, PingPayload, PongPayload, StatusMessage},
};

use super::session::ConnectionHandle;

pub(crate) const PONG_MESSAGE: &str = "Pong from worksync relay";

/// Accepts either a JSON document serialized into a string or a structured
/// value.
fn decode_argument<T: DeserializeOwned>(value: &Value) -> Result<T, serde_json::Error> {
    match value {
        Value::String(raw) => serde_json::from_str(raw),
        other => serde_json::from_value(other.clone()),
    }
}

/// Returns `false` when the ping was malformed and dropped.
pub fn handle_ping(connection: &ConnectionHandle, data: &[Value]) -> bool {
    let Some(argument) = data.first() else {
        warn!(socket_id = %connection.socket_id(), "ping without payload dropped");
        return false;
    };
    let ping = match decode_argument::<PingPayload>(argument) {
        Ok(ping) => ping,
        Err(error) => {
            warn!(socket_id = %connection.socket_id(), error = %error, "malformed ping dropped");
            return false;
        }
    };

    let now = Utc::now();
    let pong = PongPayload {
        timestamp: now.timestamp_millis(),
        server_time: now.to_rfc3339(),
        message: PONG_MESSAGE.to_string(),
        received_ping: ping,
        socket_id: connection.socket_id().to_string(),
        server_status: "ok".to_string(),
    };
    connection.emit(EVENT_TEST_PONG, &pong);
    true
}

/// Returns `false` when the heartbeat was answered with an error.
pub fn handle_heartbeat(connection: &ConnectionHandle, ack_id: Option<u64>, data: &[Value]) -> bool {
    let Some(argument) = data.first() else {
        connection.reply_to(ack_id, &AckResponse::error("No heartbeat data"));
        return false;
    };
    let heartbeat = match decode_argument::<HeartbeatPayload>(argument) {
        Ok(heartbeat) => heartbeat,
        Err(error) => {
            debug!(socket_id = %connection.socket_id(), error = %error, "invalid heartbeat");
            connection.reply_to(ack_id, &AckResponse::error("Invalid heartbeat data"));
            return false;
        }
    };

    debug!(
        socket_id = %connection.socket_id(),
        client_id = %heartbeat.client_id,
        client_timestamp = heartbeat.timestamp,
        "heartbeat"
    );
    connection.reply_to(
        ack_id,
        &HeartbeatAck {
            status: "ok".to_string(),
            server_time: Utc::now().timestamp_millis(),
            socket_id: connection.socket_id().to_string(),
        },
    );
    true
}

pub fn handle_workspace_stats(connection: &ConnectionHandle, ack_id: Option<u64>) {
    connection.reply_to(
        ack_id,
        &StatusMessage::new("not_implemented", "Workspace stats functionality is not available."),
    );
}
