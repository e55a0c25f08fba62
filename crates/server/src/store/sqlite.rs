// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

/// SQLite-backed store. Every process opening the same database file shares
/// one view of rooms, messages, memberships, and sessions.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
        let opts = SqliteConnectOptions::from_str(database_url)
            .context("parse sqlite url")?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        // Each connection to an in-memory database is its own database.
        let max_connections = if in_memory { 1 } else { 16 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await
            .context("connect sqlite")?;

        sqlx::migrate!("migrations/sqlite").run(&pool).await.context("run sqlite migrations")?;
        Ok(Self { pool })
    }

    pub async fn hash_set(&self, key: &str, field: &str, value: &str) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO kv_hash (key, field, value) VALUES (?, ?, ?) \
             ON CONFLICT(key, field) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(field)
        .bind(value)
        .execute(&self.pool)
        .await
        .context("hash_set")?;
        Ok(())
    }

    pub async fn hash_set_nx(&self, key: &str, field: &str, value: &str) -> anyhow::Result<bool> {
        let res = sqlx::query(
            "INSERT INTO kv_hash (key, field, value) VALUES (?, ?, ?) \
             ON CONFLICT(key, field) DO NOTHING",
        )
        .bind(key)
        .bind(field)
        .bind(value)
        .execute(&self.pool)
        .await
        .context("hash_set_nx")?;
        Ok(res.rows_affected() == 1)
    }

    pub async fn hash_get(&self, key: &str, field: &str) -> anyhow::Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM kv_hash WHERE key = ? AND field = ?")
                .bind(key)
                .bind(field)
                .fetch_optional(&self.pool)
                .await
                .context("hash_get")?;
        Ok(row.map(|(v,)| v))
    }

    pub async fn hash_del(&self, key: &str, field: &str) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM kv_hash WHERE key = ? AND field = ?")
            .bind(key)
            .bind(field)
            .execute(&self.pool)
            .await
            .context("hash_del")?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn hash_exists(&self, key: &str, field: &str) -> anyhow::Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM kv_hash WHERE key = ? AND field = ?")
                .bind(key)
                .bind(field)
                .fetch_optional(&self.pool)
                .await
                .context("hash_exists")?;
        Ok(row.is_some())
    }

    pub async fn hash_len(&self, key: &str) -> anyhow::Result<u64> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM kv_hash WHERE key = ?")
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .context("hash_len")?;
        Ok(n.max(0) as u64)
    }

    pub async fn set_add(&self, key: &str, member: &str) -> anyhow::Result<bool> {
        let res = sqlx::query(
            "INSERT INTO kv_set (key, member) VALUES (?, ?) ON CONFLICT(key, member) DO NOTHING",
        )
        .bind(key)
        .bind(member)
        .execute(&self.pool)
        .await
        .context("set_add")?;
        Ok(res.rows_affected() == 1)
    }

    pub async fn set_remove(&self, key: &str, member: &str) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM kv_set WHERE key = ? AND member = ?")
            .bind(key)
            .bind(member)
            .execute(&self.pool)
            .await
            .context("set_remove")?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn set_card(&self, key: &str) -> anyhow::Result<u64> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM kv_set WHERE key = ?")
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .context("set_card")?;
        Ok(n.max(0) as u64)
    }

    pub async fn set_members(&self, key: &str) -> anyhow::Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT member FROM kv_set WHERE key = ? ORDER BY member")
                .bind(key)
                .fetch_all(&self.pool)
                .await
                .context("set_members")?;
        Ok(rows.into_iter().map(|(m,)| m).collect())
    }

    // Both nested operations write before they read, so the transaction holds
    // the database write lock for its whole span.

    pub async fn nested_set_add(
        &self,
        child_key: &str,
        child_member: &str,
        parent_key: &str,
        parent_member: &str,
    ) -> anyhow::Result<u64> {
        let mut tx = self.pool.begin().await.context("nested_set_add: begin")?;
        for (key, member) in [(child_key, child_member), (parent_key, parent_member)] {
            sqlx::query(
                "INSERT INTO kv_set (key, member) VALUES (?, ?) ON CONFLICT(key, member) DO NOTHING",
            )
            .bind(key)
            .bind(member)
            .execute(&mut *tx)
            .await
            .context("nested_set_add")?;
        }
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM kv_set WHERE key = ?")
            .bind(parent_key)
            .fetch_one(&mut *tx)
            .await
            .context("nested_set_add: count")?;
        tx.commit().await.context("nested_set_add: commit")?;
        Ok(n.max(0) as u64)
    }

    pub async fn nested_set_remove(
        &self,
        child_key: &str,
        child_member: &str,
        parent_key: &str,
        parent_member: &str,
    ) -> anyhow::Result<u64> {
        let mut tx = self.pool.begin().await.context("nested_set_remove: begin")?;
        sqlx::query("DELETE FROM kv_set WHERE key = ? AND member = ?")
            .bind(child_key)
            .bind(child_member)
            .execute(&mut *tx)
            .await
            .context("nested_set_remove: child")?;
        sqlx::query(
            "DELETE FROM kv_set WHERE key = ? AND member = ? \
             AND NOT EXISTS (SELECT 1 FROM kv_set WHERE key = ?)",
        )
        .bind(parent_key)
        .bind(parent_member)
        .bind(child_key)
        .execute(&mut *tx)
        .await
        .context("nested_set_remove: parent")?;
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM kv_set WHERE key = ?")
            .bind(parent_key)
            .fetch_one(&mut *tx)
            .await
            .context("nested_set_remove: count")?;
        tx.commit().await.context("nested_set_remove: commit")?;
        Ok(n.max(0) as u64)
    }

    pub async fn list_push(&self, key: &str, value: &str) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO kv_list (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .context("list_push")?;
        Ok(())
    }

    pub async fn list_range(&self, key: &str) -> anyhow::Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT value FROM kv_list WHERE key = ? ORDER BY seq")
                .bind(key)
                .fetch_all(&self.pool)
                .await
                .context("list_range")?;
        Ok(rows.into_iter().map(|(v,)| v).collect())
    }
}
