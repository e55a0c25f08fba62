// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport.

pub mod http;
pub mod ws;
pub mod ws_msg;

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::coordinator::Coordinator;

/// Shared state behind every handler.
pub struct AppState {
    pub coordinator: Coordinator,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub cors_origin: Option<String>,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(coordinator: Coordinator, shutdown: CancellationToken) -> Self {
        Self {
            coordinator,
            heartbeat_interval: Duration::from_secs(25),
            heartbeat_timeout: Duration::from_secs(60),
            cors_origin: None,
            shutdown,
        }
    }
}

/// Build the axum `Router` with every route.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(state.cors_origin.as_deref());
    Router::new()
        .route("/api/health", get(http::health))
        .route("/api/status", get(http::status))
        .route("/api/rooms/{room_id}", get(http::get_room))
        .route(
            "/api/rooms/{room_id}/messages",
            get(http::list_room_messages).post(http::post_room_message),
        )
        .route(
            "/api/clients/{client_id}/rooms",
            get(http::list_client_rooms).post(http::create_client_room),
        )
        .route("/api/clients/{client_id}/rooms/{room_id}", get(http::get_client_room))
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    match origin.and_then(|o| HeaderValue::from_str(o).ok()) {
        Some(origin) => CorsLayer::new()
            .allow_origin(AllowOrigin::exact(origin))
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    }
}
