// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection → identity and connection → rooms bindings.
//!
//! Both maps live in the shared store so every process sees the same
//! bindings, and are removed when the connection goes away.

use anyhow::Context;

use crate::store::Store;

const CLIENTS_KEY: &str = "socket:clients";
const ROOMS_KEY: &str = "socket:rooms";

#[derive(Clone)]
pub struct SessionRegistry {
    store: Store,
}

impl SessionRegistry {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Bind `conn_id` to `proposed` exactly as sent, or to a fresh UUID when
    /// none (or an empty one) is offered. Rebinding replaces the previous
    /// identity.
    pub async fn register(&self, conn_id: &str, proposed: Option<&str>) -> anyhow::Result<String> {
        let identity = match proposed {
            Some(id) if !id.is_empty() => id.to_owned(),
            _ => uuid::Uuid::new_v4().to_string(),
        };
        self.store.hash_set(CLIENTS_KEY, conn_id, &identity).await.context("bind identity")?;
        Ok(identity)
    }

    pub async fn identity_of(&self, conn_id: &str) -> anyhow::Result<Option<String>> {
        self.store.hash_get(CLIENTS_KEY, conn_id).await
    }

    /// Drop every binding held for `conn_id`.
    pub async fn forget(&self, conn_id: &str) -> anyhow::Result<()> {
        self.store.hash_del(CLIENTS_KEY, conn_id).await?;
        self.store.hash_del(ROOMS_KEY, conn_id).await?;
        Ok(())
    }

    /// Record the rooms `conn_id` has joined. An empty list clears the record.
    pub async fn set_rooms(&self, conn_id: &str, rooms: &[String]) -> anyhow::Result<()> {
        if rooms.is_empty() {
            self.store.hash_del(ROOMS_KEY, conn_id).await?;
            return Ok(());
        }
        let json = serde_json::to_string(rooms)?;
        self.store.hash_set(ROOMS_KEY, conn_id, &json).await
    }

    pub async fn rooms_of(&self, conn_id: &str) -> anyhow::Result<Vec<String>> {
        match self.store.hash_get(ROOMS_KEY, conn_id).await? {
            Some(json) => serde_json::from_str(&json).context("decode connection rooms"),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_keeps_proposed_identity() -> anyhow::Result<()> {
        let sessions = SessionRegistry::new(Store::memory());
        assert_eq!(sessions.register("c1", Some("u1")).await?, "u1");
        assert_eq!(sessions.identity_of("c1").await?.as_deref(), Some("u1"));
        Ok(())
    }

    #[yare::parameterized(
        absent = { None },
        empty = { Some("") },
    )]
    #[test_macro(tokio::test)]
    async fn register_allocates_uuid(proposed: Option<&str>) -> anyhow::Result<()> {
        let sessions = SessionRegistry::new(Store::memory());
        let identity = sessions.register("c1", proposed).await?;
        assert!(uuid::Uuid::parse_str(&identity).is_ok());
        assert_eq!(sessions.identity_of("c1").await?, Some(identity));
        Ok(())
    }

    #[yare::parameterized(
        leading_space = { " u1" },
        trailing_space = { "u1 " },
        only_spaces = { "  " },
    )]
    #[test_macro(tokio::test)]
    async fn register_keeps_identity_bytes(proposed: &str) -> anyhow::Result<()> {
        let sessions = SessionRegistry::new(Store::memory());
        assert_eq!(sessions.register("c1", Some(proposed)).await?, proposed);
        assert_eq!(sessions.identity_of("c1").await?.as_deref(), Some(proposed));
        Ok(())
    }

    #[tokio::test]
    async fn rebinding_replaces_identity() -> anyhow::Result<()> {
        let sessions = SessionRegistry::new(Store::memory());
        sessions.register("c1", Some("u1")).await?;
        sessions.register("c1", Some("u2")).await?;
        assert_eq!(sessions.identity_of("c1").await?.as_deref(), Some("u2"));
        Ok(())
    }

    #[tokio::test]
    async fn forget_clears_both_maps() -> anyhow::Result<()> {
        let sessions = SessionRegistry::new(Store::memory());
        sessions.register("c1", Some("u1")).await?;
        sessions.set_rooms("c1", &["R".to_owned()]).await?;

        sessions.forget("c1").await?;
        assert_eq!(sessions.identity_of("c1").await?, None);
        assert!(sessions.rooms_of("c1").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn empty_room_list_deletes_record() -> anyhow::Result<()> {
        let store = Store::memory();
        let sessions = SessionRegistry::new(store.clone());
        sessions.set_rooms("c1", &["R".to_owned()]).await?;
        assert_eq!(sessions.rooms_of("c1").await?, vec!["R"]);

        sessions.set_rooms("c1", &[]).await?;
        assert!(!store.hash_exists("socket:rooms", "c1").await?);
        Ok(())
    }
}
