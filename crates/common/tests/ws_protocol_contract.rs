use worksync_common::protocol::{
    frame::{EVENT_FILE_UPDATE_ACK, EVENT_SERVER_STATUS, EVENT_TEST_PONG, INBOUND_EVENTS},
    sync::AckStatus,
};
use worksync_common::types::EventKind;

fn load_contract() -> serde_json::Value {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../contracts/socket-events.json");
    let content = std::fs::read_to_string(path).expect("contract file should be readable");
    serde_json::from_str(&content).expect("contract file should be valid JSON")
}

fn string_list(contract: &serde_json::Value, key: &str) -> Vec<String> {
    let mut values: Vec<String> = contract[key]
        .as_array()
        .unwrap_or_else(|| panic!("{key} should be an array"))
        .iter()
        .map(|v| v.as_str().expect("entry should be a string").to_string())
        .collect();
    values.sort();
    values
}

#[test]
fn inbound_events_match_contract() {
    let contract = load_contract();
    let mut actual: Vec<String> = INBOUND_EVENTS.iter().map(|event| event.to_string()).collect();
    actual.sort();
    assert_eq!(actual, string_list(&contract, "inbound_events"));
}

#[test]
fn outbound_events_match_contract() {
    let contract = load_contract();
    let mut actual: Vec<String> = [EVENT_SERVER_STATUS, EVENT_FILE_UPDATE_ACK, EVENT_TEST_PONG]
        .iter()
        .map(|event| event.to_string())
        .collect();
    actual.sort();
    assert_eq!(actual, string_list(&contract, "outbound_events"));
}

#[test]
fn ack_statuses_match_contract() {
    let contract = load_contract();
    let mut actual: Vec<String> = [AckStatus::Received, AckStatus::Success, AckStatus::Error]
        .iter()
        .map(|status| status.as_str().to_string())
        .collect();
    actual.sort();
    assert_eq!(actual, string_list(&contract, "ack_statuses"));
}

#[test]
fn file_event_kinds_match_contract() {
    let contract = load_contract();
    let mut actual: Vec<String> =
        EventKind::ALL.iter().map(|kind| kind.as_str().to_string()).collect();
    actual.sort();
    assert_eq!(actual, string_list(&contract, "file_event_kinds"));
}
