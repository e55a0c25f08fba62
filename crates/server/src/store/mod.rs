// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Key/value primitives shared by every durable component.
//!
//! The room directory, message log, membership tracker, and session registry
//! only talk to storage through these hash/set/list primitives. Two backends
//! exist: an in-process [`MemoryStore`] for single-node development and
//! tests, and a [`SqliteStore`] that every server process can share.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Storage backend handle. Cheap to clone.
#[derive(Clone)]
pub enum Store {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl Store {
    /// An empty in-process store.
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    /// Open the backend selected by `database_url` (`None` means memory).
    pub async fn open(database_url: Option<&str>) -> anyhow::Result<Self> {
        match database_url {
            None => Ok(Self::memory()),
            Some(url) if url.starts_with("sqlite:") => {
                Ok(Self::Sqlite(SqliteStore::connect(url).await?))
            }
            Some(url) => anyhow::bail!("unsupported database url (use sqlite:): {url}"),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Sqlite(_) => "sqlite",
        }
    }

    /// Set `field` of hash `key`, replacing any previous value.
    pub async fn hash_set(&self, key: &str, field: &str, value: &str) -> anyhow::Result<()> {
        match self {
            Self::Memory(m) => m.hash_set(key, field, value),
            Self::Sqlite(s) => s.hash_set(key, field, value).await,
        }
    }

    /// Set `field` only when absent. Returns `true` when the value was written.
    pub async fn hash_set_nx(&self, key: &str, field: &str, value: &str) -> anyhow::Result<bool> {
        match self {
            Self::Memory(m) => m.hash_set_nx(key, field, value),
            Self::Sqlite(s) => s.hash_set_nx(key, field, value).await,
        }
    }

    pub async fn hash_get(&self, key: &str, field: &str) -> anyhow::Result<Option<String>> {
        match self {
            Self::Memory(m) => m.hash_get(key, field),
            Self::Sqlite(s) => s.hash_get(key, field).await,
        }
    }

    /// Remove `field`. Returns `true` when it existed.
    pub async fn hash_del(&self, key: &str, field: &str) -> anyhow::Result<bool> {
        match self {
            Self::Memory(m) => m.hash_del(key, field),
            Self::Sqlite(s) => s.hash_del(key, field).await,
        }
    }

    pub async fn hash_exists(&self, key: &str, field: &str) -> anyhow::Result<bool> {
        match self {
            Self::Memory(m) => m.hash_exists(key, field),
            Self::Sqlite(s) => s.hash_exists(key, field).await,
        }
    }

    pub async fn hash_len(&self, key: &str) -> anyhow::Result<u64> {
        match self {
            Self::Memory(m) => m.hash_len(key),
            Self::Sqlite(s) => s.hash_len(key).await,
        }
    }

    /// Add `member` to set `key`. Returns `true` when it was not yet present.
    pub async fn set_add(&self, key: &str, member: &str) -> anyhow::Result<bool> {
        match self {
            Self::Memory(m) => m.set_add(key, member),
            Self::Sqlite(s) => s.set_add(key, member).await,
        }
    }

    /// Remove `member` from set `key`. Returns `true` when it was present.
    pub async fn set_remove(&self, key: &str, member: &str) -> anyhow::Result<bool> {
        match self {
            Self::Memory(m) => m.set_remove(key, member),
            Self::Sqlite(s) => s.set_remove(key, member).await,
        }
    }

    pub async fn set_card(&self, key: &str) -> anyhow::Result<u64> {
        match self {
            Self::Memory(m) => m.set_card(key),
            Self::Sqlite(s) => s.set_card(key).await,
        }
    }

    /// All members of set `key`, sorted.
    pub async fn set_members(&self, key: &str) -> anyhow::Result<Vec<String>> {
        match self {
            Self::Memory(m) => m.set_members(key),
            Self::Sqlite(s) => s.set_members(key).await,
        }
    }

    /// Atomically add `child_member` to set `child_key` and `parent_member`
    /// to set `parent_key`. Returns the cardinality of `parent_key` afterwards.
    pub async fn nested_set_add(
        &self,
        child_key: &str,
        child_member: &str,
        parent_key: &str,
        parent_member: &str,
    ) -> anyhow::Result<u64> {
        match self {
            Self::Memory(m) => m.nested_set_add(child_key, child_member, parent_key, parent_member),
            Self::Sqlite(s) => s.nested_set_add(child_key, child_member, parent_key, parent_member).await,
        }
    }

    /// Atomically remove `child_member` from set `child_key`, then remove
    /// `parent_member` from `parent_key` if `child_key` is left empty.
    /// Returns the cardinality of `parent_key` afterwards.
    pub async fn nested_set_remove(
        &self,
        child_key: &str,
        child_member: &str,
        parent_key: &str,
        parent_member: &str,
    ) -> anyhow::Result<u64> {
        match self {
            Self::Memory(m) => m.nested_set_remove(child_key, child_member, parent_key, parent_member),
            Self::Sqlite(s) => {
                s.nested_set_remove(child_key, child_member, parent_key, parent_member).await
            }
        }
    }

    /// Append `value` to list `key`.
    pub async fn list_push(&self, key: &str, value: &str) -> anyhow::Result<()> {
        match self {
            Self::Memory(m) => m.list_push(key, value),
            Self::Sqlite(s) => s.list_push(key, value).await,
        }
    }

    /// Every element of list `key` in append order.
    pub async fn list_range(&self, key: &str) -> anyhow::Result<Vec<String>> {
        match self {
            Self::Memory(m) => m.list_range(key),
            Self::Sqlite(s) => s.list_range(key).await,
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
