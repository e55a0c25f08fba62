// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound events and the fan-out scopes they are published to.

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::model::{Message, Room, RoomMemberEvent};

/// Server → client frames, internally tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    Registered {
        client_id: String,
    },
    RoomList {
        rooms: Vec<Room>,
    },
    NewRoom {
        room: Room,
    },
    RoomCreated {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        room_id: String,
    },
    MessageHistory {
        room_id: String,
        messages: Vec<Message>,
    },
    RoomMemberCount {
        room_id: String,
        count: u64,
    },
    RoomMemberChange(RoomMemberEvent),
    NewMessage {
        message: Message,
    },
    RoomInfo {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        room: Option<Room>,
    },
    UploadAccepted {
        file_id: String,
        total_chunks: u32,
    },
    Error {
        code: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    Pong {},
}

impl ServerEvent {
    pub fn error(code: ErrorCode, message: impl Into<String>, request_id: Option<String>) -> Self {
        Self::Error { code: code.as_str().to_owned(), message: message.into(), request_id }
    }

    /// Short name for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Registered { .. } => "registered",
            Self::RoomList { .. } => "room_list",
            Self::NewRoom { .. } => "new_room",
            Self::RoomCreated { .. } => "room_created",
            Self::MessageHistory { .. } => "message_history",
            Self::RoomMemberCount { .. } => "room_member_count",
            Self::RoomMemberChange(_) => "room_member_change",
            Self::NewMessage { .. } => "new_message",
            Self::RoomInfo { .. } => "room_info",
            Self::UploadAccepted { .. } => "upload_accepted",
            Self::Error { .. } => "error",
            Self::Pong {} => "pong",
        }
    }
}

/// Audience of a published event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Scope {
    /// Every connection joined to the room.
    Room(String),
    /// Every connection registered as the identity.
    Client(String),
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Room(id) => write!(f, "room:{id}"),
            Self::Client(id) => write!(f, "client:{id}"),
        }
    }
}
