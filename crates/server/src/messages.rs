// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only per-room message log.

use anyhow::Context;
use tracing::warn;

use crate::model::Message;
use crate::store::Store;

fn log_key(room_id: &str) -> String {
    format!("room:{room_id}:messages")
}

#[derive(Clone)]
pub struct MessageLog {
    store: Store,
}

impl MessageLog {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn append(&self, message: &Message) -> anyhow::Result<()> {
        let json = serde_json::to_string(message).context("encode message")?;
        self.store
            .list_push(&log_key(&message.room_id), &json)
            .await
            .with_context(|| format!("append to room {}", message.room_id))
    }

    /// Full history of `room_id`, oldest first.
    pub async fn read_all(&self, room_id: &str) -> anyhow::Result<Vec<Message>> {
        let raw = self
            .store
            .list_range(&log_key(room_id))
            .await
            .with_context(|| format!("read history of room {room_id}"))?;
        Ok(raw
            .iter()
            .enumerate()
            .filter_map(|(index, json)| match serde_json::from_str(json) {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!(room_id, index, "skipping undecodable message: {e}");
                    None
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MessageKind;

    fn message(room_id: &str, content: &str) -> Message {
        Message {
            id: uuid::Uuid::new_v4().to_string(),
            client_id: "u1".to_owned(),
            content: content.to_owned(),
            room_id: room_id.to_owned(),
            timestamp: crate::clock::iso8601_now(),
            message_type: MessageKind::Text,
            username: None,
            avatar: None,
            mime_type: None,
        }
    }

    #[tokio::test]
    async fn empty_room_has_no_history() -> anyhow::Result<()> {
        let log = MessageLog::new(Store::memory());
        assert!(log.read_all("R").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn history_is_append_order_and_room_scoped() -> anyhow::Result<()> {
        let log = MessageLog::new(Store::memory());
        let first = message("R", "one");
        let second = message("R", "two");
        log.append(&first).await?;
        log.append(&message("OTHER", "elsewhere")).await?;
        log.append(&second).await?;

        assert_eq!(log.read_all("R").await?, vec![first, second]);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_appends_keep_each_writer_in_order() -> anyhow::Result<()> {
        let log = MessageLog::new(Store::memory());
        let mut tasks = Vec::new();
        for writer in 0..8 {
            let log = log.clone();
            tasks.push(tokio::spawn(async move {
                for seq in 0..25 {
                    log.append(&message("R", &format!("{writer}:{seq}"))).await?;
                }
                anyhow::Ok(())
            }));
        }
        for task in tasks {
            task.await??;
        }

        let history = log.read_all("R").await?;
        assert_eq!(history.len(), 200);
        for writer in 0..8 {
            let seqs: Vec<u32> = history
                .iter()
                .filter_map(|m| m.content.split_once(':'))
                .filter(|(w, _)| *w == writer.to_string())
                .filter_map(|(_, s)| s.parse().ok())
                .collect();
            assert_eq!(seqs, (0..25).collect::<Vec<_>>());
        }
        Ok(())
    }

    #[tokio::test]
    async fn undecodable_entries_are_skipped() -> anyhow::Result<()> {
        let store = Store::memory();
        let log = MessageLog::new(store.clone());
        let good = message("R", "ok");
        store.list_push("room:R:messages", "{broken").await?;
        log.append(&good).await?;

        assert_eq!(log.read_all("R").await?, vec![good]);
        Ok(())
    }
}
