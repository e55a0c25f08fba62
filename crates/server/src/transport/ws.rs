// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `GET /ws`: one task per socket.
//!
//! The task owns the [`Connection`]. It reads frames in order, drains the
//! connection's outbox to the socket, pings on every heartbeat tick, and
//! drops the socket once no frame has arrived within the heartbeat timeout.
//! An outbound write that stalls past the heartbeat timeout, or an outbox
//! that overflows, also drops the socket. Cleanup runs after the loop,
//! whatever ended it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::ErrorCode;
use crate::event::ServerEvent;
use crate::transport::ws_msg::handle_frame;
use crate::transport::AppState;

/// Largest accepted frame.
pub const MAX_FRAME_BYTES: usize = 5 * 1024 * 1024;

pub async fn ws_handler(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.max_message_size(MAX_FRAME_BYTES).on_upgrade(move |socket| handle_connection(state, socket))
}

async fn handle_connection(state: Arc<AppState>, socket: WebSocket) {
    let coord = &state.coordinator;
    let (mut conn, mut outbox_rx) = coord.connect();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut heartbeat = tokio::time::interval(state.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
    heartbeat.tick().await;
    let mut last_inbound = Instant::now();
    let overflow = conn.overflow_token();
    let deadline = state.heartbeat_timeout;

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                let _ = send_within(&mut ws_tx, Message::Close(None), deadline).await;
                break;
            }
            _ = overflow.cancelled() => {
                warn!(conn_id = conn.id(), "outbox overflowed, dropping connection");
                break;
            }
            event = outbox_rx.recv() => {
                let Some(event) = event else { break };
                let Ok(text) = serde_json::to_string(&event) else {
                    warn!(conn_id = conn.id(), "failed to encode outbound event");
                    continue;
                };
                if let Err(e) = send_within(&mut ws_tx, Message::Text(text.into()), deadline).await {
                    info!(conn_id = conn.id(), "outbound send failed: {e}");
                    break;
                }
            }
            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        debug!(conn_id = conn.id(), "socket error: {e}");
                        break;
                    }
                    None => break,
                };
                last_inbound = Instant::now();

                match msg {
                    Message::Text(text) => {
                        for reply in handle_frame(coord, &mut conn, text.as_str()).await {
                            conn.send(reply);
                        }
                    }
                    Message::Binary(_) => {
                        conn.send(ServerEvent::error(
                            ErrorCode::ValidationError,
                            "binary frames are not supported",
                            None,
                        ));
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            _ = heartbeat.tick() => {
                if last_inbound.elapsed() > state.heartbeat_timeout {
                    info!(conn_id = conn.id(), "heartbeat timeout");
                    break;
                }
                conn.sweep_uploads();
                if let Err(e) = send_within(&mut ws_tx, Message::Ping(Default::default()), deadline).await {
                    info!(conn_id = conn.id(), "ping failed: {e}");
                    break;
                }
            }
        }
    }

    coord.disconnect(conn).await;
}

#[derive(Debug)]
enum SendError {
    Stalled,
    Closed,
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stalled => f.write_str("outbound send stalled"),
            Self::Closed => f.write_str("socket closed"),
        }
    }
}

/// Write one frame, giving up once `deadline` passes.
async fn send_within<S>(tx: &mut S, msg: Message, deadline: Duration) -> Result<(), SendError>
where
    S: SinkExt<Message> + Unpin,
{
    match tokio::time::timeout(deadline, tx.send(msg)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => Err(SendError::Closed),
        Err(_) => Err(SendError::Stalled),
    }
}
