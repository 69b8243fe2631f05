use serde_json::{json, Value};
use worksync_common::protocol::{
    frame::{
        decode_frame, encode_frame, Frame, EVENT_FILE_UPDATE, EVENT_FILE_UPDATE_ACK,
        EVENT_SERVER_STATUS, INBOUND_EVENTS,
    },
    sync::{AckResponse, AckStatus, FileUpdatePayload, FinalResult, StatusMessage},
};

const RELAY_WS_SESSION_SOURCE: &str = include_str!("../src/ws/session.rs");
const RELAY_WS_SOURCE: &str = include_str!("../src/ws/mod.rs");

#[test]
fn websocket_contract_heartbeat_and_frame_limits() {
    let heartbeat_interval_ms = parse_u64_const(RELAY_WS_SESSION_SOURCE, "HEARTBEAT_INTERVAL_MS");
    let heartbeat_timeout_ms = parse_u64_const(RELAY_WS_SESSION_SOURCE, "HEARTBEAT_TIMEOUT_MS");
    let max_frame_bytes = parse_u64_const(RELAY_WS_SESSION_SOURCE, "MAX_FRAME_BYTES");

    assert_eq!(heartbeat_interval_ms, 25_000);
    assert_eq!(heartbeat_timeout_ms, 20_000);
    assert_eq!(max_frame_bytes, 1_048_576);
    assert!(
        heartbeat_timeout_ms < heartbeat_interval_ms,
        "pong timeout must be shorter than heartbeat interval",
    );
}

#[test]
fn websocket_contract_socket_path_is_versioned() {
    assert!(RELAY_WS_SOURCE.contains("const SOCKET_PATH: &str = \"/v1/socket\""));
}

#[test]
fn websocket_contract_inbound_channels() {
    let mut events = INBOUND_EVENTS.to_vec();
    events.sort_unstable();
    assert_eq!(events, ["disconnect", "file:update", "heartbeat", "test:ping", "workspace:stats"]);
}

#[test]
fn websocket_contract_client_file_update_decodes() {
    let raw = json!({
        "type": "event",
        "event": EVENT_FILE_UPDATE,
        "ack_id": 3,
        "data": [{
            "id": "evt-1",
            "filePath": "src/lib.rs",
            "hash": "abc",
            "previousHash": "def",
            "event": "modified",
            "content": "fn main() {}",
            "timestamp": 1_700_000_000_000_i64,
            "apiKey": "sk-live",
            "workspacePath": "/home/dev/app",
        }],
    })
    .to_string();

    let Frame::Event { event, data, ack_id } = decode_frame(&raw).expect("client frame should decode")
    else {
        panic!("client frame must be an event");
    };
    assert_eq!(event, EVENT_FILE_UPDATE);
    assert_eq!(ack_id, Some(3));

    let payload: FileUpdatePayload =
        serde_json::from_value(data[0].clone()).expect("payload should decode");
    assert_eq!(payload.file_path, "src/lib.rs");
    assert_eq!(payload.previous_hash, "def");
    assert_eq!(payload.api_key, "sk-live");
    assert_eq!(payload.workspace_path, "/home/dev/app");
}

#[test]
fn websocket_contract_server_message_shapes() {
    let samples = [
        (
            Frame::ack(3, to_value(&AckResponse::received("evt-1"))),
            "ack",
            &["type", "ack_id", "data"][..],
            &["id", "status", "message"][..],
        ),
        (
            Frame::event(
                EVENT_FILE_UPDATE_ACK,
                to_value(&FinalResult {
                    id: "evt-1".to_string(),
                    status: AckStatus::Success,
                    message: "File updated successfully".to_string(),
                    file: "src/lib.rs".to_string(),
                }),
            ),
            "event",
            &["type", "event", "data"][..],
            &["id", "status", "message", "file"][..],
        ),
        (
            Frame::event(EVENT_SERVER_STATUS, to_value(&StatusMessage::new("ready", "ok"))),
            "event",
            &["type", "event", "data"][..],
            &["status", "message"][..],
        ),
    ];

    for (frame, expected_type, frame_keys, payload_keys) in samples {
        let encoded = encode_frame(&frame).expect("frame should encode");
        let value: Value = serde_json::from_str(&encoded).expect("encoded frame is json");
        assert_eq!(value["type"], expected_type);
        for key in frame_keys {
            assert!(value.get(key).is_some(), "`{expected_type}` frame must include `{key}`");
        }
        for key in payload_keys {
            assert!(value["data"][0].get(key).is_some(), "payload must include `{key}`");
        }
    }
}

#[test]
fn websocket_contract_error_ack_omits_id() {
    let value = to_value(&AckResponse::error("Invalid data format"));
    assert_eq!(value, json!({ "status": "error", "message": "Invalid data format" }));
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).expect("payload should serialize")
}

fn parse_u64_const(source: &str, name: &str) -> u64 {
    let needle = format!("const {name}:");
    let index = source.find(&needle).expect("constant must be declared");
    let line = source[index..].lines().next().expect("constant declaration line must exist");
    let raw_value = line
        .split('=')
        .nth(1)
        .expect("constant must have assignment")
        .trim()
        .trim_end_matches(';')
        .replace('_', "");
    raw_value
        .parse::<u64>()
        .unwrap_or_else(|error| panic!("failed to parse `{name}` from `{line}`: {error}"))
}
