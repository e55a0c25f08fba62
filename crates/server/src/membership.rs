// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-room presence.
//!
//! `room:{id}:members` holds identities; `room:{id}:member:{identity}` holds
//! the connection ids through which that identity is present. An identity
//! leaves the room only when its last connection does, so the member count
//! never double-counts tabs and never evicts a user whose other tab stays.
//!
//! Join and leave each update both sets in one store operation, so a join
//! racing the final leave of the same identity, even from another process,
//! cannot strand a connection without its identity.

use crate::store::Store;

fn members_key(room_id: &str) -> String {
    format!("room:{room_id}:members")
}

fn connections_key(room_id: &str, identity: &str) -> String {
    format!("room:{room_id}:member:{identity}")
}

#[derive(Clone)]
pub struct Membership {
    store: Store,
}

impl Membership {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Record `conn_id` as present in `room_id` for `identity`. Returns the
    /// member count afterwards.
    pub async fn join(&self, room_id: &str, identity: &str, conn_id: &str) -> anyhow::Result<u64> {
        self.store
            .nested_set_add(&connections_key(room_id, identity), conn_id, &members_key(room_id), identity)
            .await
    }

    /// Remove `conn_id` from `room_id`. The identity is removed once none of
    /// its connections remain. Returns the member count afterwards.
    pub async fn leave(&self, room_id: &str, identity: &str, conn_id: &str) -> anyhow::Result<u64> {
        self.store
            .nested_set_remove(&connections_key(room_id, identity), conn_id, &members_key(room_id), identity)
            .await
    }

    pub async fn count(&self, room_id: &str) -> anyhow::Result<u64> {
        self.store.set_card(&members_key(room_id)).await
    }

    pub async fn members(&self, room_id: &str) -> anyhow::Result<Vec<String>> {
        self.store.set_members(&members_key(room_id)).await
    }

    pub async fn is_member(&self, room_id: &str, identity: &str) -> anyhow::Result<bool> {
        Ok(self.store.set_card(&connections_key(room_id, identity)).await? > 0)
    }
}

#[cfg(test)]
#[path = "membership_tests.rs"]
mod tests;
