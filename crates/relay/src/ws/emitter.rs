use tracing::warn;
use worksync_common::protocol::{
    frame::EVENT_FILE_UPDATE_ACK,
    sync::{AckResponse, FinalResult},
};

use super::session::ConnectionHandle;
use crate::reconcile::ReconciliationOutcome;

/// Direct "received" reply sent before reconciliation starts.
pub fn acknowledge_received(connection: &ConnectionHandle, ack_id: Option<u64>, id: &str) {
    connection.reply_to(ack_id, &AckResponse::received(id));
}

/// Direct error reply; the payload is not reconciled.
pub fn reject(connection: &ConnectionHandle, ack_id: Option<u64>, message: &str) {
    connection.reply_to(ack_id, &AckResponse::error(message));
}

pub fn emit_final_result(connection: &ConnectionHandle, outcome: ReconciliationOutcome) {
    let result: FinalResult = outcome.into_final_result();
    if !connection.emit(EVENT_FILE_UPDATE_ACK, &result) {
        warn!(
            socket_id = %connection.socket_id(),
            id = %result.id,
            file = %result.file,
            status = result.status.as_str(),
            "final result undeliverable; connection closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc;
    use uuid::Uuid;
    use worksync_common::protocol::{frame::Frame, sync::AckStatus};

    use super::{acknowledge_received, emit_final_result, reject};
    use crate::{
        reconcile::{ChangeNotification, ReconciliationOutcome},
        ws::session::ConnectionHandle,
    };

    #[tokio::test]
    async fn received_ack_echoes_notification_id() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let connection = ConnectionHandle::new(Uuid::new_v4(), sender);

        acknowledge_received(&connection, Some(1), "n-1");

        assert_eq!(
            receiver.recv().await.expect("ack queued"),
            Frame::ack(
                1,
                json!({ "id": "n-1", "status": "received", "message": "File update received, processing..." })
            )
        );
    }

    #[tokio::test]
    async fn reject_sends_error_status() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let connection = ConnectionHandle::new(Uuid::new_v4(), sender);

        reject(&connection, Some(2), "No data provided");

        assert_eq!(
            receiver.recv().await.expect("ack queued"),
            Frame::ack(2, json!({ "status": "error", "message": "No data provided" }))
        );
    }

    #[tokio::test]
    async fn final_result_is_a_file_update_ack_event() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let connection = ConnectionHandle::new(Uuid::new_v4(), sender);
        let notification = ChangeNotification {
            id: "n-7".into(),
            file_path: "src/a.rs".into(),
            ..ChangeNotification::default()
        };

        emit_final_result(
            &connection,
            ReconciliationOutcome::succeeded(&notification, "File created successfully"),
        );

        let Frame::Event { event, data, ack_id } = receiver.recv().await.expect("event queued")
        else {
            panic!("final result must be an event frame");
        };
        assert_eq!(event, "file:update:ack");
        assert_eq!(ack_id, None);
        assert_eq!(data[0]["id"], "n-7");
        assert_eq!(data[0]["status"], AckStatus::Success.as_str());
        assert_eq!(data[0]["file"], "src/a.rs");
    }

    #[test]
    fn final_result_to_closed_connection_is_dropped() {
        let (sender, receiver) = mpsc::unbounded_channel();
        drop(receiver);
        let connection = ConnectionHandle::new(Uuid::new_v4(), sender);

        emit_final_result(
            &connection,
            ReconciliationOutcome::failed(&ChangeNotification::default(), "late"),
        );
    }
}
