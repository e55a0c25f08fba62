// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection state machine and the operations both transports call.
//!
//! A [`Connection`] is owned by the task serving its socket, so operations on
//! one connection run strictly in frame order. Everything shared between
//! connections lives in the [`Store`] or the [`Bus`].
//!
//! Direct replies are returned to the caller. Broadcasts go through the bus,
//! including the caller's own copy when it is subscribed to the scope.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use base64::Engine;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{Bus, Outbox, OUTBOX_CAPACITY};
use crate::clock::iso8601_now;
use crate::error::{ChatError, ErrorCode};
use crate::event::{Scope, ServerEvent};
use crate::membership::Membership;
use crate::messages::MessageLog;
use crate::model::{Avatar, MemberAction, Message, MessageKind, Room, RoomMemberEvent, UserInfo};
use crate::rooms::RoomDirectory;
use crate::session::SessionRegistry;
use crate::store::Store;
use crate::upload::{reencode_webp, CompletedUpload, UploadLimits, Uploads, WEBP_MIME};

/// One live client connection.
pub struct Connection {
    id: String,
    /// Last identity bound through this connection. Used for cleanup when
    /// the registry cannot be read.
    identity: Option<String>,
    room: Option<String>,
    uploads: Uploads,
    outbox: Outbox,
}

impl Connection {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    /// Queue a direct reply behind any broadcasts already queued. A reply
    /// that does not fit overflows the outbox, which ends the connection.
    pub fn send(&self, event: ServerEvent) {
        if !self.outbox.push(event) && self.outbox.is_overflowed() {
            warn!(conn_id = %self.id, "outbox overflowed on direct reply");
        }
    }

    /// Cancelled once this connection's outbox overflows.
    pub fn overflow_token(&self) -> CancellationToken {
        self.outbox.overflow_token()
    }

    /// Drop idle upload sessions.
    pub fn sweep_uploads(&mut self) -> usize {
        let expired = self.uploads.sweep(Instant::now());
        for file_id in &expired {
            debug!(conn_id = %self.id, file_id, "upload session expired");
        }
        expired.len()
    }

    pub fn pending_uploads(&self) -> usize {
        self.uploads.len()
    }
}

/// Result of a successful register.
#[derive(Debug, Clone)]
pub struct Registration {
    pub client_id: String,
    pub rooms: Vec<Room>,
}

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub room: Room,
    pub history: Vec<Message>,
    pub count: u64,
}

/// Message fields supplied by a client.
#[derive(Debug, Clone, Default)]
pub struct MessageDraft {
    pub room_id: String,
    pub content: String,
    pub kind: MessageKind,
    pub username: Option<String>,
    pub avatar: Option<Avatar>,
}

impl MessageDraft {
    pub fn text(room_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { room_id: room_id.into(), content: content.into(), ..Self::default() }
    }
}

pub struct Coordinator {
    store: Store,
    sessions: SessionRegistry,
    rooms: RoomDirectory,
    messages: MessageLog,
    membership: Membership,
    bus: Bus,
    upload_limits: UploadLimits,
    live: AtomicUsize,
}

impl Coordinator {
    pub fn new(store: Store, bus: Bus, upload_limits: UploadLimits) -> Self {
        Self {
            sessions: SessionRegistry::new(store.clone()),
            rooms: RoomDirectory::new(store.clone()),
            messages: MessageLog::new(store.clone()),
            membership: Membership::new(store.clone()),
            store,
            bus,
            upload_limits,
            live: AtomicUsize::new(0),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn rooms(&self) -> &RoomDirectory {
        &self.rooms
    }

    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn live_connections(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    /// Open a connection. The receiver yields everything destined for it.
    pub fn connect(&self) -> (Connection, mpsc::Receiver<ServerEvent>) {
        let (outbox, rx) = Outbox::channel(OUTBOX_CAPACITY);
        let conn = Connection {
            id: uuid::Uuid::new_v4().to_string(),
            identity: None,
            room: None,
            uploads: Uploads::new(self.upload_limits),
            outbox,
        };
        self.live.fetch_add(1, Ordering::Relaxed);
        info!(conn_id = %conn.id, "connection opened");
        (conn, rx)
    }

    async fn require_identity(&self, conn: &Connection) -> Result<String, ChatError> {
        self.sessions
            .identity_of(&conn.id)
            .await
            .map_err(ChatError::storage)?
            .ok_or_else(ChatError::unregistered)
    }

    // -- Registration ---------------------------------------------------------

    pub async fn register(
        &self,
        conn: &mut Connection,
        proposed: Option<&str>,
    ) -> Result<Registration, ChatError> {
        let target = match proposed {
            Some(id) if !id.is_empty() => id.to_owned(),
            _ => uuid::Uuid::new_v4().to_string(),
        };

        if let Some(old) = conn.identity.clone().filter(|old| *old != target) {
            if conn.room.is_some() {
                self.leave_current(conn, &old).await?;
            }
            self.bus.unsubscribe(&Scope::Client(old.clone()), &conn.id);
            info!(conn_id = %conn.id, from = %old, to = %target, "identity rebound");
        }

        let client_id =
            self.sessions.register(&conn.id, Some(&target)).await.map_err(ChatError::storage)?;
        conn.identity = Some(client_id.clone());
        self.bus.subscribe(Scope::Client(client_id.clone()), &conn.id, conn.outbox.clone());
        info!(conn_id = %conn.id, client_id = %client_id, "client registered");

        let rooms = self.rooms_or_empty(&client_id).await;
        Ok(Registration { client_id, rooms })
    }

    // -- Rooms ----------------------------------------------------------------

    pub async fn list_rooms(&self, conn: &Connection) -> Result<Vec<Room>, ChatError> {
        let identity = self.require_identity(conn).await?;
        Ok(self.rooms_or_empty(&identity).await)
    }

    async fn rooms_or_empty(&self, identity: &str) -> Vec<Room> {
        match self.rooms.list_by_creator(identity).await {
            Ok(rooms) => rooms,
            Err(e) => {
                warn!(client_id = identity, "room list unavailable: {e:#}");
                Vec::new()
            }
        }
    }

    /// Rooms created by `identity`. Storage errors surface.
    pub async fn rooms_of(&self, identity: &str) -> Result<Vec<Room>, ChatError> {
        self.rooms.list_by_creator(identity).await.map_err(ChatError::storage)
    }

    pub async fn create_room(
        &self,
        conn: &Connection,
        name: &str,
        description: Option<&str>,
    ) -> Result<Room, ChatError> {
        let identity = self.require_identity(conn).await?;
        self.create_room_as(&identity, name, description).await
    }

    /// Create a room on behalf of `identity` and notify its connections.
    pub async fn create_room_as(
        &self,
        identity: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<Room, ChatError> {
        let room = self.rooms.create(identity, name, description).await?;
        self.bus.publish(Scope::Client(identity.to_owned()), ServerEvent::NewRoom { room: room.clone() }).await;
        Ok(room)
    }

    /// `None` for unknown rooms and for storage failures.
    pub async fn get_room_by_id(&self, room_id: &str) -> Option<Room> {
        match self.rooms.get(room_id).await {
            Ok(room) => room,
            Err(e) => {
                warn!(room_id, "room lookup failed: {e:#}");
                None
            }
        }
    }

    /// Room lookup with storage errors surfaced.
    pub async fn room_by_id(&self, room_id: &str) -> Result<Option<Room>, ChatError> {
        self.rooms.get(room_id).await.map_err(ChatError::storage)
    }

    // -- Membership -----------------------------------------------------------

    pub async fn join_room(
        &self,
        conn: &mut Connection,
        room_id: &str,
    ) -> Result<JoinOutcome, ChatError> {
        let identity = self.require_identity(conn).await?;
        let room_id = room_id.trim();
        if room_id.is_empty() {
            return Err(ChatError::validation("roomId must not be empty"));
        }

        // Completes, publish included, before the new join starts.
        self.leave_current(conn, &identity).await?;

        let room = self
            .rooms
            .get(room_id)
            .await
            .map_err(ChatError::storage)?
            .ok_or_else(|| ChatError::not_found(format!("room {room_id} not found")))?;

        let scope = Scope::Room(room.id.clone());
        self.bus.subscribe(scope.clone(), &conn.id, conn.outbox.clone());
        let count = match self.membership.join(&room.id, &identity, &conn.id).await {
            Ok(count) => count,
            Err(e) => {
                self.bus.unsubscribe(&scope, &conn.id);
                return Err(ChatError::storage(e));
            }
        };
        conn.room = Some(room.id.clone());
        if let Err(e) = self.sessions.set_rooms(&conn.id, std::slice::from_ref(&room.id)).await {
            warn!(conn_id = %conn.id, room_id = %room.id, "failed to record joined room: {e:#}");
        }

        self.bus.publish(scope, member_event(&room.id, &identity, count, MemberAction::Join)).await;
        info!(conn_id = %conn.id, client_id = %identity, room_id = %room.id, count, "joined room");

        let history = self.get_room_messages(&room.id).await;
        Ok(JoinOutcome { room, history, count })
    }

    pub async fn leave_room(&self, conn: &mut Connection, room_id: &str) -> Result<(), ChatError> {
        let identity = self.require_identity(conn).await?;
        if conn.room.as_deref() != Some(room_id.trim()) {
            return Err(ChatError::not_found(format!("not in room {room_id}")));
        }
        self.leave_current(conn, &identity).await
    }

    /// Leave protocol for the connection's current room, if any.
    async fn leave_current(&self, conn: &mut Connection, identity: &str) -> Result<(), ChatError> {
        let Some(room_id) = conn.room.clone() else {
            return Ok(());
        };
        let count =
            self.membership.leave(&room_id, identity, &conn.id).await.map_err(ChatError::storage)?;

        let scope = Scope::Room(room_id.clone());
        self.bus.unsubscribe(&scope, &conn.id);
        conn.room = None;
        if let Err(e) = self.sessions.set_rooms(&conn.id, &[]).await {
            warn!(conn_id = %conn.id, room_id = %room_id, "failed to clear joined room: {e:#}");
        }

        self.bus.publish(scope, member_event(&room_id, identity, count, MemberAction::Leave)).await;
        info!(conn_id = %conn.id, client_id = identity, room_id = %room_id, count, "left room");
        Ok(())
    }

    // -- Messages -------------------------------------------------------------

    /// History of `room_id`, or empty when it cannot be read.
    pub async fn get_room_messages(&self, room_id: &str) -> Vec<Message> {
        match self.messages.read_all(room_id).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(room_id, "history unavailable: {e:#}");
                Vec::new()
            }
        }
    }

    /// History of `room_id` with storage errors surfaced.
    pub async fn room_messages(&self, room_id: &str) -> Result<Vec<Message>, ChatError> {
        self.messages.read_all(room_id).await.map_err(ChatError::storage)
    }

    pub async fn send_message(
        &self,
        conn: &Connection,
        draft: MessageDraft,
    ) -> Result<Message, ChatError> {
        let identity = self.require_identity(conn).await?;
        self.send_message_as(&identity, draft).await
    }

    /// Append a message on behalf of `identity` and broadcast it to the room.
    pub async fn send_message_as(
        &self,
        identity: &str,
        draft: MessageDraft,
    ) -> Result<Message, ChatError> {
        if draft.room_id.trim().is_empty() {
            return Err(ChatError::validation("roomId must not be empty"));
        }
        if draft.content.trim().is_empty() {
            return Err(ChatError::validation("message content must not be empty"));
        }
        self.post(identity, draft, None).await
    }

    async fn post(
        &self,
        identity: &str,
        draft: MessageDraft,
        mime_type: Option<&str>,
    ) -> Result<Message, ChatError> {
        let room_id = draft.room_id.trim();
        if self.rooms.get(room_id).await.map_err(ChatError::storage)?.is_none() {
            return Err(ChatError::not_found(format!("room {room_id} not found")));
        }

        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            client_id: identity.to_owned(),
            content: draft.content,
            room_id: room_id.to_owned(),
            timestamp: iso8601_now(),
            message_type: draft.kind,
            username: draft.username,
            avatar: draft.avatar,
            mime_type: mime_type.map(str::to_owned),
        };
        self.messages.append(&message).await.map_err(ChatError::storage)?;
        info!(
            client_id = identity,
            room_id = %message.room_id,
            message_id = %message.id,
            content = %message.loggable_content(),
            "message posted"
        );

        self.bus
            .publish(Scope::Room(message.room_id.clone()), ServerEvent::NewMessage { message: message.clone() })
            .await;
        Ok(message)
    }

    // -- Image uploads --------------------------------------------------------

    pub async fn start_image_upload(
        &self,
        conn: &mut Connection,
        file_id: &str,
        total_chunks: u32,
        room_id: &str,
    ) -> Result<(), ChatError> {
        let identity = self.require_identity(conn).await?;
        conn.uploads.start(file_id, total_chunks, room_id.trim(), &identity, Instant::now())
    }

    pub async fn upload_image_chunk(
        &self,
        conn: &mut Connection,
        file_id: &str,
        chunk_index: u32,
        chunk_data: &str,
    ) -> Result<(), ChatError> {
        self.require_identity(conn).await?;
        conn.uploads.add_chunk(file_id, chunk_index, chunk_data, Instant::now())
    }

    /// Reassemble, re-encode as lossless WebP, and post as an image message
    /// under the connection's current identity. The session is consumed even
    /// when the image cannot be decoded.
    pub async fn finish_image_upload(
        &self,
        conn: &mut Connection,
        file_id: &str,
    ) -> Result<Message, ChatError> {
        let identity = self.require_identity(conn).await?;
        let CompletedUpload { room_id, client_id, bytes, .. } =
            conn.uploads.finish(file_id, Instant::now())?;
        if client_id != identity {
            debug!(conn_id = %conn.id, file_id, from = %client_id, to = %identity, "upload rebound");
        }
        let raw_len = bytes.len();

        let webp = tokio::task::spawn_blocking(move || reencode_webp(&bytes))
            .await
            .map_err(|e| ChatError::new(ErrorCode::Internal, format!("re-encode task failed: {e}")))?
            .map_err(|e| {
                warn!(conn_id = %conn.id, file_id, "image re-encode failed: {e:#}");
                ChatError::validation(format!("image could not be processed: {e}"))
            })?;
        debug!(conn_id = %conn.id, file_id, raw_len, webp_len = webp.len(), "image re-encoded");

        let draft = MessageDraft {
            room_id,
            content: base64::engine::general_purpose::STANDARD.encode(&webp),
            kind: MessageKind::Image,
            username: None,
            avatar: None,
        };
        self.post(&identity, draft, Some(WEBP_MIME)).await
    }

    // -- Teardown -------------------------------------------------------------

    /// Release everything `conn` holds. Each step is attempted even when an
    /// earlier one fails.
    pub async fn disconnect(&self, mut conn: Connection) {
        let identity = match self.sessions.identity_of(&conn.id).await {
            Ok(Some(identity)) => Some(identity),
            Ok(None) => conn.identity.clone(),
            Err(e) => {
                warn!(conn_id = %conn.id, "identity lookup failed during cleanup: {e:#}");
                conn.identity.clone()
            }
        };

        if let Some(ref identity) = identity {
            if let Err(e) = self.leave_current(&mut conn, identity).await {
                warn!(conn_id = %conn.id, client_id = %identity, "leave during cleanup failed: {e}");
            }
        }
        if let Err(e) = self.sessions.forget(&conn.id).await {
            warn!(conn_id = %conn.id, "failed to forget session: {e:#}");
        }
        let dropped = conn.uploads.clear();
        self.bus.unsubscribe_all(&conn.id);
        self.live.fetch_sub(1, Ordering::Relaxed);
        info!(conn_id = %conn.id, client_id = identity.as_deref(), dropped_uploads = dropped, "connection closed");
    }
}

fn member_event(room_id: &str, identity: &str, count: u64, action: MemberAction) -> ServerEvent {
    ServerEvent::RoomMemberChange(RoomMemberEvent {
        room_id: room_id.to_owned(),
        user: UserInfo { id: identity.to_owned() },
        count,
        action,
        timestamp: iso8601_now(),
    })
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
