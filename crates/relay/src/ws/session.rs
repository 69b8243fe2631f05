use std::{collections::HashMap, sync::Arc};

use serde::Serialize;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;
use worksync_common::protocol::frame::Frame;

pub(crate) const HEARTBEAT_INTERVAL_MS: u64 = 25_000;
pub(crate) const HEARTBEAT_TIMEOUT_MS: u64 = 20_000;
pub(crate) const MAX_FRAME_BYTES: usize = 1_048_576;

/// Emit side of one socket connection.
///
/// Every outbound frame goes through the connection's unbounded queue, which
/// only the connection task drains, so writes never interleave. Clones are
/// handed to reconciliation tasks and outlive the socket; sends after close
/// are dropped.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    socket_id: Uuid,
    outbound: mpsc::UnboundedSender<Frame>,
}

impl ConnectionHandle {
    pub fn new(socket_id: Uuid, outbound: mpsc::UnboundedSender<Frame>) -> Self {
        Self { socket_id, outbound }
    }

    pub fn socket_id(&self) -> Uuid {
        self.socket_id
    }

    pub fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }

    /// Queue a named event. Returns `false` when the frame was dropped.
    pub fn emit<T: Serialize>(&self, event: &str, payload: &T) -> bool {
        match serde_json::to_value(payload) {
            Ok(value) => self.send(Frame::event(event, value)),
            Err(error) => {
                warn!(socket_id = %self.socket_id, event, error = %error, "failed to encode outbound event");
                false
            }
        }
    }

    /// Queue a direct reply to an inbound event. Clients that did not ask for
    /// an ack get nothing.
    pub fn reply_to<T: Serialize>(&self, ack_id: Option<u64>, payload: &T) -> bool {
        let Some(ack_id) = ack_id else {
            return false;
        };
        match serde_json::to_value(payload) {
            Ok(value) => self.send(Frame::ack(ack_id, value)),
            Err(error) => {
                warn!(socket_id = %self.socket_id, ack_id, error = %error, "failed to encode ack");
                false
            }
        }
    }

    fn send(&self, frame: Frame) -> bool {
        if self.outbound.send(frame).is_err() {
            debug!(socket_id = %self.socket_id, "connection closed; dropping outbound frame");
            return false;
        }
        true
    }
}

/// Live connections, for broadcast and status reporting.
#[derive(Debug, Clone)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<Uuid, ConnectionHandle>>>,
    shutdown: watch::Sender<bool>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self { connections: Arc::new(RwLock::new(HashMap::new())), shutdown }
    }
}

impl ConnectionRegistry {
    pub async fn register(&self, connection: ConnectionHandle) {
        self.connections.write().await.insert(connection.socket_id(), connection);
    }

    pub async fn unregister(&self, socket_id: Uuid) -> bool {
        self.connections.write().await.remove(&socket_id).is_some()
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn broadcast<T: Serialize>(&self, event: &str, payload: &T) -> usize {
        let recipients: Vec<ConnectionHandle> =
            self.connections.read().await.values().cloned().collect();

        recipients.iter().filter(|connection| connection.emit(event, payload)).count()
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Ask every connection task to flush its queue and close.
    pub fn close_all(&self) {
        self.shutdown.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc;
    use uuid::Uuid;
    use worksync_common::protocol::frame::Frame;

    use super::{ConnectionHandle, ConnectionRegistry};

    fn connection() -> (ConnectionHandle, mpsc::UnboundedReceiver<Frame>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (ConnectionHandle::new(Uuid::new_v4(), sender), receiver)
    }

    #[tokio::test]
    async fn emit_queues_named_event() {
        let (handle, mut receiver) = connection();
        assert!(handle.emit("server:status", &json!({ "status": "ready" })));

        let frame = receiver.recv().await.expect("frame should be queued");
        assert_eq!(frame, Frame::event("server:status", json!({ "status": "ready" })));
    }

    #[tokio::test]
    async fn reply_requires_client_ack_id() {
        let (handle, mut receiver) = connection();
        assert!(!handle.reply_to(None, &json!({ "status": "ok" })));
        assert!(handle.reply_to(Some(4), &json!({ "status": "ok" })));

        let frame = receiver.recv().await.expect("ack should be queued");
        assert_eq!(frame, Frame::ack(4, json!({ "status": "ok" })));
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn emit_after_close_is_dropped() {
        let (handle, receiver) = connection();
        drop(receiver);

        assert!(!handle.is_open());
        assert!(!handle.emit("file:update:ack", &json!({})));
    }

    #[tokio::test]
    async fn broadcast_reaches_every_open_connection() {
        let registry = ConnectionRegistry::default();
        let (first, mut first_rx) = connection();
        let (second, mut second_rx) = connection();
        let (closed, closed_rx) = connection();
        drop(closed_rx);
        registry.register(first).await;
        registry.register(second).await;
        registry.register(closed).await;

        let delivered = registry.broadcast("server:status", &json!({ "status": "x" })).await;

        assert_eq!(delivered, 2);
        assert!(first_rx.try_recv().is_ok());
        assert!(second_rx.try_recv().is_ok());
        assert_eq!(registry.connection_count().await, 3);
    }

    #[tokio::test]
    async fn unregister_removes_connection() {
        let registry = ConnectionRegistry::default();
        let (handle, _receiver) = connection();
        let socket_id = handle.socket_id();
        registry.register(handle).await;

        assert!(registry.unregister(socket_id).await);
        assert!(!registry.unregister(socket_id).await);
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn close_all_notifies_subscribers() {
        let registry = ConnectionRegistry::default();
        let mut signal = registry.shutdown_signal();
        assert!(!*signal.borrow());

        registry.close_all();
        signal.changed().await.expect("sender is alive");
        assert!(*signal.borrow());
    }
}
