// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::Store;

async fn sqlite_store(dir: &tempfile::TempDir) -> anyhow::Result<Store> {
    let url = format!("sqlite://{}", dir.path().join("kv.db").display());
    Store::open(Some(&url)).await
}

async fn exercise_hashes(store: &Store) -> anyhow::Result<()> {
    assert_eq!(store.hash_get("h", "a").await?, None);
    store.hash_set("h", "a", "1").await?;
    store.hash_set("h", "a", "2").await?;
    assert_eq!(store.hash_get("h", "a").await?.as_deref(), Some("2"));
    assert!(store.hash_exists("h", "a").await?);
    assert!(!store.hash_exists("h", "b").await?);

    assert!(store.hash_set_nx("h", "b", "x").await?);
    assert!(!store.hash_set_nx("h", "b", "y").await?);
    assert_eq!(store.hash_get("h", "b").await?.as_deref(), Some("x"));
    assert_eq!(store.hash_len("h").await?, 2);

    assert!(store.hash_del("h", "a").await?);
    assert!(!store.hash_del("h", "a").await?);
    assert_eq!(store.hash_len("h").await?, 1);
    assert_eq!(store.hash_len("missing").await?, 0);
    Ok(())
}

async fn exercise_sets(store: &Store) -> anyhow::Result<()> {
    assert!(store.set_add("s", "b").await?);
    assert!(store.set_add("s", "a").await?);
    assert!(!store.set_add("s", "a").await?);
    assert_eq!(store.set_card("s").await?, 2);
    assert_eq!(store.set_members("s").await?, vec!["a".to_owned(), "b".to_owned()]);

    assert!(store.set_remove("s", "a").await?);
    assert!(!store.set_remove("s", "a").await?);
    assert_eq!(store.set_card("s").await?, 1);
    assert!(store.set_members("nope").await?.is_empty());
    Ok(())
}

async fn exercise_nested_sets(store: &Store) -> anyhow::Result<()> {
    assert_eq!(store.nested_set_add("p:u1", "c1", "p", "u1").await?, 1);
    assert_eq!(store.nested_set_add("p:u1", "c2", "p", "u1").await?, 1);
    assert_eq!(store.nested_set_add("p:u2", "c3", "p", "u2").await?, 2);

    assert_eq!(store.nested_set_remove("p:u1", "c1", "p", "u1").await?, 2);
    assert_eq!(store.set_members("p:u1").await?, vec!["c2"]);
    assert_eq!(store.nested_set_remove("p:u1", "c2", "p", "u1").await?, 1);
    assert_eq!(store.set_members("p").await?, vec!["u2"]);
    assert_eq!(store.set_card("p:u1").await?, 0);

    // Removing an absent child still drops an orphaned parent member.
    store.set_add("p", "ghost").await?;
    assert_eq!(store.nested_set_remove("p:ghost", "c9", "p", "ghost").await?, 1);
    assert_eq!(store.nested_set_remove("p:nobody", "c9", "other", "nobody").await?, 0);
    Ok(())
}

async fn exercise_lists(store: &Store) -> anyhow::Result<()> {
    for v in ["one", "two", "three"] {
        store.list_push("l", v).await?;
    }
    store.list_push("other", "x").await?;
    assert_eq!(store.list_range("l").await?, vec!["one", "two", "three"]);
    assert!(store.list_range("empty").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn memory_hash_primitives() -> anyhow::Result<()> {
    exercise_hashes(&Store::memory()).await
}

#[tokio::test]
async fn memory_set_primitives() -> anyhow::Result<()> {
    exercise_sets(&Store::memory()).await
}

#[tokio::test]
async fn memory_nested_set_primitives() -> anyhow::Result<()> {
    exercise_nested_sets(&Store::memory()).await
}

#[tokio::test]
async fn memory_list_primitives() -> anyhow::Result<()> {
    exercise_lists(&Store::memory()).await
}

#[tokio::test]
async fn sqlite_hash_primitives() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    exercise_hashes(&sqlite_store(&dir).await?).await
}

#[tokio::test]
async fn sqlite_set_primitives() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    exercise_sets(&sqlite_store(&dir).await?).await
}

#[tokio::test]
async fn sqlite_nested_set_primitives() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    exercise_nested_sets(&sqlite_store(&dir).await?).await
}

#[tokio::test]
async fn sqlite_list_primitives() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    exercise_lists(&sqlite_store(&dir).await?).await
}

#[tokio::test]
async fn sqlite_in_memory_url_is_usable() -> anyhow::Result<()> {
    let store = Store::open(Some("sqlite::memory:")).await?;
    assert_eq!(store.backend_name(), "sqlite");
    exercise_lists(&store).await
}

#[tokio::test]
async fn sqlite_state_is_shared_between_handles() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let a = sqlite_store(&dir).await?;
    let b = sqlite_store(&dir).await?;

    a.hash_set("socket:clients", "conn-1", "u1").await?;
    assert_eq!(b.hash_get("socket:clients", "conn-1").await?.as_deref(), Some("u1"));
    assert!(!b.hash_set_nx("socket:clients", "conn-1", "u2").await?);
    Ok(())
}

#[tokio::test]
async fn unsupported_url_is_rejected() {
    let err = Store::open(Some("postgres://localhost/db")).await.err();
    assert!(err.is_some());
}

#[tokio::test]
async fn unavailable_memory_store_fails_every_operation() -> anyhow::Result<()> {
    let Store::Memory(inner) = Store::memory() else {
        anyhow::bail!("expected memory store");
    };
    let store = Store::Memory(inner.clone());
    store.hash_set("h", "a", "1").await?;

    inner.set_unavailable(true);
    assert!(store.hash_get("h", "a").await.is_err());
    assert!(store.set_add("s", "a").await.is_err());
    assert!(store.nested_set_add("s:a", "c", "s", "a").await.is_err());
    assert!(store.list_push("l", "a").await.is_err());

    inner.set_unavailable(false);
    assert_eq!(store.hash_get("h", "a").await?.as_deref(), Some("1"));
    Ok(())
}
