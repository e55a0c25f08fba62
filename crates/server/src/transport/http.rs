// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP API. Every handler is a thin adapter over the coordinator's
//! identity-level entry points.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::clock::iso8601_now;
use crate::coordinator::MessageDraft;
use crate::error::ChatError;
use crate::model::{Avatar, MessageKind};
use crate::transport::AppState;

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        self.code.to_http_response(self.message).into_response()
    }
}

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub connections: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub store: String,
    pub bus: String,
    pub rooms: Option<u64>,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMessageRequest {
    pub client_id: String,
    pub content: String,
    #[serde(default)]
    pub message_type: Option<MessageKind>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar: Option<Avatar>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ChatError> {
    payload.map(|Json(body)| body).map_err(|e| ChatError::validation(e.body_text()))
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/health`
pub async fn health(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        connections: s.coordinator.live_connections(),
    })
}

/// `GET /api/status`
pub async fn status(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let coord = &s.coordinator;
    let rooms = match coord.rooms().count().await {
        Ok(n) => Some(n),
        Err(e) => {
            tracing::warn!("room count unavailable: {e:#}");
            None
        }
    };
    Json(StatusResponse {
        status: if rooms.is_some() { "running" } else { "degraded" }.to_owned(),
        store: coord.store().backend_name().to_owned(),
        bus: coord.bus().mode().to_owned(),
        rooms,
        timestamp: iso8601_now(),
    })
}

/// `GET /api/rooms/{room_id}`: the room, or `null`.
pub async fn get_room(
    State(s): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<impl IntoResponse, ChatError> {
    Ok(Json(s.coordinator.room_by_id(&room_id).await?))
}

/// `GET /api/rooms/{room_id}/messages`
pub async fn list_room_messages(
    State(s): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<impl IntoResponse, ChatError> {
    tracing::debug!(room_id = %room_id, "history requested over HTTP");
    Ok(Json(s.coordinator.room_messages(&room_id).await?))
}

/// `POST /api/rooms/{room_id}/messages`: post as `clientId` and broadcast.
pub async fn post_room_message(
    State(s): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    payload: Result<Json<PostMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ChatError> {
    let req = body(payload)?;
    if req.client_id.trim().is_empty() {
        return Err(ChatError::validation("clientId must not be empty"));
    }
    let draft = MessageDraft {
        room_id,
        content: req.content,
        kind: req.message_type.unwrap_or_default(),
        username: req.username,
        avatar: req.avatar,
    };
    let message = s.coordinator.send_message_as(&req.client_id, draft).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// `GET /api/clients/{client_id}/rooms`
pub async fn list_client_rooms(
    State(s): State<Arc<AppState>>,
    Path(client_id): Path<String>,
) -> Result<impl IntoResponse, ChatError> {
    Ok(Json(s.coordinator.rooms_of(&client_id).await?))
}

/// `POST /api/clients/{client_id}/rooms`: create and notify the creator.
pub async fn create_client_room(
    State(s): State<Arc<AppState>>,
    Path(client_id): Path<String>,
    payload: Result<Json<CreateRoomRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ChatError> {
    let req = body(payload)?;
    let room =
        s.coordinator.create_room_as(&client_id, &req.name, req.description.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

/// `GET /api/clients/{client_id}/rooms/{room_id}`: 404 unless owned by the client.
pub async fn get_client_room(
    State(s): State<Arc<AppState>>,
    Path((client_id, room_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ChatError> {
    match s.coordinator.room_by_id(&room_id).await? {
        Some(room) if room.creator_id == client_id => Ok(Json(room)),
        _ => Err(ChatError::not_found(format!("room {room_id} not found for client {client_id}"))),
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
