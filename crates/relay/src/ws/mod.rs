// Socket gateway: one task per connection.
//
// The connection task owns the WebSocket. It drains the outbound queue,
// decodes inbound event frames and hands them to the `EventRouter`, and
// keeps the peer alive with protocol-level pings.

pub mod emitter;
pub mod liveness;
pub mod router;
pub mod session;

use std::time::Duration;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
    Router,
};
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, warn};
use uuid::Uuid;
use worksync_common::protocol::frame::{decode_frame, encode_frame, Frame};

use crate::{
    error::{current_request_id, request_id_from_headers_or_generate, with_request_id_scope},
    metrics,
};
pub use router::{EventRouter, RouteOutcome};
pub use session::{ConnectionHandle, ConnectionRegistry};
use session::{HEARTBEAT_INTERVAL_MS, HEARTBEAT_TIMEOUT_MS, MAX_FRAME_BYTES};

pub(crate) const SOCKET_PATH: &str = "/v1/socket";

#[derive(Clone)]
pub(crate) struct SocketState {
    pub(crate) router: EventRouter,
    pub(crate) registry: ConnectionRegistry,
}

pub fn router(event_router: EventRouter, registry: ConnectionRegistry) -> Router {
    Router::new()
        .route(SOCKET_PATH, get(ws_upgrade))
        .with_state(SocketState { router: event_router, registry })
}

async fn ws_upgrade(
    State(state): State<SocketState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let request_id = request_id_from_headers_or_generate(&headers);
    ws.max_frame_size(MAX_FRAME_BYTES)
        .max_message_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| async move {
            with_request_id_scope(request_id, handle_socket(state, socket)).await;
        })
}

fn frame_size_exceeded_reason() -> String {
    format!("websocket frame exceeds maximum size of {MAX_FRAME_BYTES} bytes")
}

fn is_frame_size_violation(error: &axum::Error) -> bool {
    let message = error.to_string().to_ascii_lowercase();
    message.contains("message too long")
        || message.contains("frame too long")
        || message.contains("too large")
        || message.contains("too big")
        || message.contains("size limit")
}

async fn close_with(socket: &mut WebSocket, code: u16, reason: String) {
    let _ = socket.send(Message::Close(Some(CloseFrame { code, reason: reason.into() }))).await;
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let encoded = encode_frame(frame).map_err(|_| ())?;
    socket.send(Message::Text(encoded.into())).await.map_err(|_| ())
}

async fn pong_overdue(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn handle_socket(state: SocketState, mut socket: WebSocket) {
    let socket_id = Uuid::new_v4();
    let request_id = current_request_id().unwrap_or_else(|| "unknown".to_string());
    let (outbound_sender, mut outbound_receiver) = mpsc::unbounded_channel::<Frame>();
    let connection = ConnectionHandle::new(socket_id, outbound_sender);
    let mut shutdown = state.registry.shutdown_signal();

    state.registry.register(connection.clone()).await;
    metrics::connection_opened();
    debug!(socket_id = %socket_id, request_id = %request_id, "socket upgraded");
    state.router.on_connect(&connection);

    let mut heartbeat_interval = tokio::time::interval(Duration::from_millis(HEARTBEAT_INTERVAL_MS));
    heartbeat_interval.reset();
    let heartbeat_timeout = Duration::from_millis(HEARTBEAT_TIMEOUT_MS);
    // Set while a ping is unanswered.
    let mut pong_deadline: Option<Instant> = None;

    let reason: String = loop {
        tokio::select! {
            _ = heartbeat_interval.tick() => {
                if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break "transport error".to_string();
                }
                if pong_deadline.is_none() {
                    pong_deadline = Some(Instant::now() + heartbeat_timeout);
                }
            }
            _ = pong_overdue(pong_deadline) => {
                warn!(socket_id = %socket_id, request_id = %request_id, "heartbeat timeout, disconnecting");
                close_with(&mut socket, close_code::AWAY, "ping timeout".to_string()).await;
                break "ping timeout".to_string();
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    while let Ok(frame) = outbound_receiver.try_recv() {
                        if send_frame(&mut socket, &frame).await.is_err() {
                            break;
                        }
                    }
                    close_with(&mut socket, close_code::AWAY, "server shutting down".to_string()).await;
                    break "server shutting down".to_string();
                }
            }
            maybe_outbound = outbound_receiver.recv() => {
                let Some(frame) = maybe_outbound else {
                    break "transport close".to_string();
                };
                if send_frame(&mut socket, &frame).await.is_err() {
                    break "transport error".to_string();
                }
            }
            maybe_message = socket.recv() => {
                let Some(message) = maybe_message else {
                    break "transport close".to_string();
                };

                match message {
                    Ok(Message::Text(raw_message)) => {
                        if raw_message.len() > MAX_FRAME_BYTES {
                            close_with(&mut socket, close_code::SIZE, frame_size_exceeded_reason()).await;
                            break "frame too large".to_string();
                        }

                        match decode_frame(&raw_message) {
                            Ok(Frame::Event { event, data, ack_id }) => {
                                if let RouteOutcome::Disconnect(reason) =
                                    state.router.dispatch(&connection, &event, data, ack_id)
                                {
                                    close_with(&mut socket, close_code::NORMAL, reason.clone()).await;
                                    break reason;
                                }
                            }
                            Ok(Frame::Ack { ack_id, .. }) => {
                                debug!(socket_id = %socket_id, ack_id, "ignoring client ack frame");
                            }
                            Err(error) => {
                                metrics::record_ws_event("invalid_frame", true);
                                warn!(socket_id = %socket_id, error = %error, "undecodable frame ignored");
                            }
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break "transport error".to_string();
                        }
                    }
                    Ok(Message::Pong(_)) => {
                        pong_deadline = None;
                    }
                    Ok(Message::Close(frame)) => {
                        break frame
                            .map(|frame| frame.reason.as_str().to_owned())
                            .filter(|reason| !reason.is_empty())
                            .unwrap_or_else(|| "unknown".to_string());
                    }
                    Ok(Message::Binary(_)) => {
                        metrics::record_ws_event("binary", true);
                        debug!(socket_id = %socket_id, "binary frames are not supported");
                    }
                    Err(error) => {
                        if is_frame_size_violation(&error) {
                            close_with(&mut socket, close_code::SIZE, frame_size_exceeded_reason()).await;
                            break "frame too large".to_string();
                        }
                        break "transport error".to_string();
                    }
                }
            }
        }
    };

    state.registry.unregister(socket_id).await;
    metrics::connection_closed();
    state.router.on_disconnect(&connection, &reason);
}
