use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use worksync_common::protocol::{
    frame::{
        EVENT_DISCONNECT, EVENT_FILE_UPDATE, EVENT_HEARTBEAT, EVENT_SERVER_STATUS,
        EVENT_TEST_PING, EVENT_WORKSPACE_STATS,
    },
    sync::{AckResponse, StatusMessage},
};

use super::{emitter, liveness, session::ConnectionHandle};
use crate::{
    metrics,
    reconcile::{RawPayload, Reconciler},
};

pub(crate) const CLIENT_DISCONNECT_REASON: &str = "client namespace disconnect";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Continue,
    Disconnect(String),
}

/// Binds the inbound channels of every connection to their handlers.
#[derive(Clone)]
pub struct EventRouter {
    reconciler: Reconciler,
}

impl EventRouter {
    pub fn new(reconciler: Reconciler) -> Self {
        Self { reconciler }
    }

    pub fn on_connect(&self, connection: &ConnectionHandle) {
        info!(socket_id = %connection.socket_id(), "client connected");
        connection.emit(
            EVENT_SERVER_STATUS,
            &StatusMessage::new("ready", "Server is ready to receive updates"),
        );
    }

    pub fn on_disconnect(&self, connection: &ConnectionHandle, reason: &str) {
        info!(socket_id = %connection.socket_id(), reason, "client disconnected");
    }

    pub fn dispatch(
        &self,
        connection: &ConnectionHandle,
        event: &str,
        data: Vec<Value>,
        ack_id: Option<u64>,
    ) -> RouteOutcome {
        let ok = match event {
            EVENT_FILE_UPDATE => self.handle_file_update(connection, data, ack_id),
            EVENT_TEST_PING => liveness::handle_ping(connection, &data),
            EVENT_HEARTBEAT => liveness::handle_heartbeat(connection, ack_id, &data),
            EVENT_WORKSPACE_STATS => {
                liveness::handle_workspace_stats(connection, ack_id);
                true
            }
            EVENT_DISCONNECT => {
                metrics::record_ws_event(event, false);
                let reason = data
                    .first()
                    .and_then(Value::as_str)
                    .filter(|reason| !reason.is_empty())
                    .unwrap_or(CLIENT_DISCONNECT_REASON);
                return RouteOutcome::Disconnect(reason.to_string());
            }
            unknown => {
                warn!(socket_id = %connection.socket_id(), event = unknown, "unknown event ignored");
                connection.reply_to(ack_id, &AckResponse::error(format!("Unknown event: {unknown}")));
                metrics::record_ws_event("unknown", true);
                return RouteOutcome::Continue;
            }
        };
        metrics::record_ws_event(event, !ok);
        RouteOutcome::Continue
    }

    /// Replies immediately and reconciles on a separate task. Returns `false`
    /// when the payload was rejected before reconciliation.
    fn handle_file_update(
        &self,
        connection: &ConnectionHandle,
        data: Vec<Value>,
        ack_id: Option<u64>,
    ) -> bool {
        let Some(argument) = data.into_iter().next() else {
            emitter::reject(connection, ack_id, "No data provided");
            return false;
        };
        let notification = match RawPayload::from_value(argument).and_then(RawPayload::decode) {
            Ok(notification) => notification,
            Err(error) => {
                debug!(socket_id = %connection.socket_id(), error = ?error, "undecodable file update");
                emitter::reject(connection, ack_id, &error.to_string());
                return false;
            }
        };

        debug!(
            socket_id = %connection.socket_id(),
            id = %notification.id,
            event = %notification.event_kind,
            file = %notification.file_path,
            "file update received"
        );
        emitter::acknowledge_received(connection, ack_id, &notification.id);

        let reconciler = self.reconciler.clone();
        let connection = connection.clone();
        tokio::spawn(async move {
            let started_at = Instant::now();
            let outcome = reconciler.reconcile(&notification).await;
            metrics::record_reconcile_outcome(
                &notification.event_kind,
                outcome.status.as_str(),
                started_at.elapsed().as_millis() as u64,
            );
            emitter::emit_final_result(&connection, outcome);
        });
        true
    }
}
