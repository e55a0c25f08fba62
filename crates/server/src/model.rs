// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable chat entities and the membership event payload.
//!
//! Field names are camelCase on the wire; the web client consumes these
//! shapes directly.

use serde::{Deserialize, Serialize};

/// A chat room. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: String,
    pub creator_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
}

/// Avatar descriptor chosen by the client (initials and a color).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Avatar {
    pub text: String,
    pub color: String,
}

/// A message appended to a room's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub client_id: String,
    pub content: String,
    pub room_id: String,
    pub timestamp: String,
    #[serde(default)]
    pub message_type: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<Avatar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl Message {
    /// Log-safe rendition: text truncated, image payloads reduced to a size.
    pub fn loggable_content(&self) -> String {
        match self.message_type {
            MessageKind::Image => format!("<image {} bytes b64>", self.content.len()),
            MessageKind::Text => truncate_chars(&self.content, LOG_CONTENT_CHARS),
        }
    }
}

const LOG_CONTENT_CHARS: usize = 80;

/// Truncate to at most `max` chars without splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_owned(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberAction {
    Join,
    Leave,
}

/// Broadcast when an identity joins or leaves a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMemberEvent {
    pub room_id: String,
    pub user: UserInfo,
    pub count: u64,
    pub action: MemberAction,
    pub timestamp: String,
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
