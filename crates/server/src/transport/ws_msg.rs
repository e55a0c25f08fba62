// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client → server frames and their dispatch onto the coordinator.
//!
//! Replies are returned rather than written so the socket task can queue
//! them behind broadcasts already in the connection's outbox.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coordinator::{Connection, Coordinator, MessageDraft};
use crate::error::{ChatError, ErrorCode};
use crate::event::ServerEvent;
use crate::model::{Avatar, MessageKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Register {
        #[serde(default)]
        identity: Option<String>,
    },
    GetRooms {},
    CreateRoom {
        name: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        request_id: Option<String>,
    },
    JoinRoom {
        room_id: String,
    },
    LeaveRoom {
        room_id: String,
    },
    GetRoomMessages {
        room_id: String,
    },
    SendMessage {
        room_id: String,
        content: String,
        #[serde(default)]
        message_type: Option<MessageKind>,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        avatar: Option<Avatar>,
    },
    StartImageUpload {
        file_id: String,
        total_chunks: u32,
        room_id: String,
    },
    UploadImageChunk {
        file_id: String,
        chunk_index: u32,
        chunk_data: String,
    },
    FinishImageUpload {
        file_id: String,
    },
    GetRoomById {
        room_id: String,
        #[serde(default)]
        request_id: Option<String>,
    },
    Ping {},
}

impl ClientMessage {
    fn request_id(&self) -> Option<String> {
        match self {
            Self::CreateRoom { request_id, .. } | Self::GetRoomById { request_id, .. } => {
                request_id.clone()
            }
            _ => None,
        }
    }
}

/// Parse and handle one text frame.
pub async fn handle_frame(
    coord: &Coordinator,
    conn: &mut Connection,
    text: &str,
) -> Vec<ServerEvent> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => handle_client_message(coord, conn, msg).await,
        Err(e) => {
            debug!(conn_id = conn.id(), "malformed frame: {e}");
            vec![ServerEvent::error(ErrorCode::ValidationError, format!("invalid message: {e}"), None)]
        }
    }
}

/// Run one client message and collect the direct replies.
pub async fn handle_client_message(
    coord: &Coordinator,
    conn: &mut Connection,
    msg: ClientMessage,
) -> Vec<ServerEvent> {
    let request_id = msg.request_id();
    match dispatch(coord, conn, msg).await {
        Ok(replies) => replies,
        Err(e) => {
            debug!(conn_id = conn.id(), code = %e.code, "request failed: {}", e.message);
            vec![ServerEvent::error(e.code, e.message, request_id)]
        }
    }
}

async fn dispatch(
    coord: &Coordinator,
    conn: &mut Connection,
    msg: ClientMessage,
) -> Result<Vec<ServerEvent>, ChatError> {
    let replies = match msg {
        ClientMessage::Ping {} => vec![ServerEvent::Pong {}],

        ClientMessage::Register { identity } => {
            let reg = coord.register(conn, identity.as_deref()).await?;
            vec![
                ServerEvent::Registered { client_id: reg.client_id },
                ServerEvent::RoomList { rooms: reg.rooms },
            ]
        }

        ClientMessage::GetRooms {} => {
            vec![ServerEvent::RoomList { rooms: coord.list_rooms(conn).await? }]
        }

        ClientMessage::CreateRoom { name, description, request_id } => {
            let room = coord.create_room(conn, &name, description.as_deref()).await?;
            vec![ServerEvent::RoomCreated { request_id, room_id: room.id }]
        }

        ClientMessage::JoinRoom { room_id } => {
            let joined = coord.join_room(conn, &room_id).await?;
            vec![
                ServerEvent::MessageHistory { room_id: joined.room.id.clone(), messages: joined.history },
                ServerEvent::RoomMemberCount { room_id: joined.room.id, count: joined.count },
            ]
        }

        ClientMessage::LeaveRoom { room_id } => {
            coord.leave_room(conn, &room_id).await?;
            vec![]
        }

        ClientMessage::GetRoomMessages { room_id } => {
            let messages = coord.get_room_messages(&room_id).await;
            vec![ServerEvent::MessageHistory { room_id, messages }]
        }

        ClientMessage::SendMessage { room_id, content, message_type, username, avatar } => {
            let draft = MessageDraft {
                room_id,
                content,
                kind: message_type.unwrap_or_default(),
                username,
                avatar,
            };
            coord.send_message(conn, draft).await?;
            vec![]
        }

        ClientMessage::StartImageUpload { file_id, total_chunks, room_id } => {
            coord.start_image_upload(conn, &file_id, total_chunks, &room_id).await?;
            vec![ServerEvent::UploadAccepted { file_id, total_chunks }]
        }

        ClientMessage::UploadImageChunk { file_id, chunk_index, chunk_data } => {
            coord.upload_image_chunk(conn, &file_id, chunk_index, &chunk_data).await?;
            vec![]
        }

        ClientMessage::FinishImageUpload { file_id } => {
            coord.finish_image_upload(conn, &file_id).await?;
            vec![]
        }

        ClientMessage::GetRoomById { room_id, request_id } => {
            let room = coord.get_room_by_id(&room_id).await;
            vec![ServerEvent::RoomInfo { request_id, room }]
        }
    };
    Ok(replies)
}

#[cfg(test)]
#[path = "ws_msg_tests.rs"]
mod tests;
