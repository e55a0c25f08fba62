// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable room catalog and the rooms-by-creator index.
//!
//! Room ids are short random codes. Allocation inserts with
//! `hash_set_nx`, so two processes racing on the same code cannot both win.
//! After [`ATTEMPTS_PER_LENGTH`] collisions at [`ROOM_ID_LEN`] the code grows
//! to [`ESCALATED_ROOM_ID_LEN`]. With 62^10 codes the chance of needing the
//! escalation at all is negligible, but not zero, and exhaustion of both
//! lengths surfaces as a storage error rather than a silent overwrite.

use anyhow::Context;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::clock::iso8601_now;
use crate::error::ChatError;
use crate::model::Room;
use crate::store::Store;

pub const ROOM_ID_ALPHABET: &[u8] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
pub const ROOM_ID_LEN: usize = 10;
pub const ESCALATED_ROOM_ID_LEN: usize = 12;
pub const ATTEMPTS_PER_LENGTH: usize = 5;

const ROOMS_KEY: &str = "rooms";

fn creator_key(identity: &str) -> String {
    format!("user:{identity}:rooms")
}

/// Random code of `len` characters over [`ROOM_ID_ALPHABET`].
pub fn generate_room_id(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| ROOM_ID_ALPHABET[rng.random_range(0..ROOM_ID_ALPHABET.len())] as char)
        .collect()
}

#[derive(Clone)]
pub struct RoomDirectory {
    store: Store,
}

impl RoomDirectory {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Create a room owned by `creator`.
    pub async fn create(
        &self,
        creator: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<Room, ChatError> {
        self.create_with(creator, name, description, generate_room_id).await
    }

    /// [`create`](Self::create) with an injectable id generator.
    pub(crate) async fn create_with(
        &self,
        creator: &str,
        name: &str,
        description: Option<&str>,
        mut next_id: impl FnMut(usize) -> String,
    ) -> Result<Room, ChatError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ChatError::validation("room name must not be empty"));
        }

        let mut room = Room {
            id: String::new(),
            name: name.to_owned(),
            description: description.map(str::trim).unwrap_or_default().to_owned(),
            created_at: iso8601_now(),
            creator_id: creator.to_owned(),
        };

        for len in [ROOM_ID_LEN, ESCALATED_ROOM_ID_LEN] {
            for attempt in 1..=ATTEMPTS_PER_LENGTH {
                room.id = next_id(len);
                let json = serde_json::to_string(&room)
                    .map_err(|e| ChatError::storage(anyhow::Error::new(e)))?;
                let inserted = self
                    .store
                    .hash_set_nx(ROOMS_KEY, &room.id, &json)
                    .await
                    .map_err(ChatError::storage)?;
                if inserted {
                    self.store
                        .set_add(&creator_key(creator), &room.id)
                        .await
                        .map_err(ChatError::storage)?;
                    info!(room_id = %room.id, client_id = creator, name = %room.name, "room created");
                    return Ok(room);
                }
                debug!(room_id = %room.id, len, attempt, "room id collision");
            }
            warn!(len, "room id space congested, escalating");
        }

        Err(ChatError::storage(anyhow::anyhow!("could not allocate a unique room id")))
    }

    pub async fn get(&self, room_id: &str) -> anyhow::Result<Option<Room>> {
        let Some(json) = self.store.hash_get(ROOMS_KEY, room_id).await? else {
            return Ok(None);
        };
        let room = serde_json::from_str(&json).with_context(|| format!("decode room {room_id}"))?;
        Ok(Some(room))
    }

    /// Rooms created by `identity`, oldest first.
    pub async fn list_by_creator(&self, identity: &str) -> anyhow::Result<Vec<Room>> {
        let ids = self.store.set_members(&creator_key(identity)).await?;
        let mut rooms = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get(&id).await? {
                Some(room) => rooms.push(room),
                None => warn!(room_id = %id, client_id = identity, "indexed room missing"),
            }
        }
        rooms.sort_by(|a, b| (&a.created_at, &a.id).cmp(&(&b.created_at, &b.id)));
        Ok(rooms)
    }

    pub async fn count(&self) -> anyhow::Result<u64> {
        self.store.hash_len(ROOMS_KEY).await
    }
}

#[cfg(test)]
#[path = "rooms_tests.rs"]
mod tests;
