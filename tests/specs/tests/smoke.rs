// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `parlor` binary.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

use parlor::model::Room;
use parlor_specs::ParlorProcess;

const TIMEOUT: Duration = Duration::from_secs(10);

async fn next_of<S>(ws: &mut S, kind: &str) -> anyhow::Result<Value>
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(TIMEOUT, ws.next())
            .await?
            .ok_or_else(|| anyhow::anyhow!("ws stream closed"))??;
        if let Message::Text(t) = msg {
            let event: Value = serde_json::from_str(t.as_str())?;
            if event["type"] == kind {
                return Ok(event);
            }
        }
    }
}

// -- HTTP ---------------------------------------------------------------------

#[tokio::test]
async fn http_health_and_status() -> anyhow::Result<()> {
    let parlor = ParlorProcess::start()?;
    parlor.wait_healthy(TIMEOUT).await?;

    let health: Value = reqwest::get(format!("{}/api/health", parlor.base_url())).await?.json().await?;
    assert_eq!(health["status"], "running");
    assert_eq!(health["connections"], 0);

    let status: Value = reqwest::get(format!("{}/api/status", parlor.base_url())).await?.json().await?;
    assert_eq!(status["status"], "running");
    assert_eq!(status["store"], "memory");
    assert_eq!(status["bus"], "local");
    assert_eq!(status["rooms"], 0);
    Ok(())
}

#[tokio::test]
async fn http_post_reaches_websocket_members() -> anyhow::Result<()> {
    let parlor = ParlorProcess::start()?;
    parlor.wait_healthy(TIMEOUT).await?;
    let client = reqwest::Client::new();

    let room: Room = client
        .post(format!("{}/api/clients/alice/rooms", parlor.base_url()))
        .json(&json!({ "name": "Lobby", "description": "general chat" }))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(room.description, "general chat");

    let (mut ws, _) = tokio_tungstenite::connect_async(parlor.ws_url()).await?;
    ws.send(Message::Text(json!({"type": "register", "identity": "bob"}).to_string().into())).await?;
    ws.send(Message::Text(json!({"type": "join_room", "roomId": room.id}).to_string().into())).await?;
    let count = next_of(&mut ws, "room_member_count").await?;
    assert_eq!(count["count"], 1);

    let resp = client
        .post(format!("{}/api/rooms/{}/messages", parlor.base_url(), room.id))
        .json(&json!({ "clientId": "alice", "content": "posted over http" }))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 201);

    let msg = next_of(&mut ws, "new_message").await?;
    assert_eq!(msg["message"]["content"], "posted over http");
    assert_eq!(msg["message"]["clientId"], "alice");
    Ok(())
}

// -- Lifecycle ----------------------------------------------------------------

#[tokio::test]
async fn sigterm_shuts_down_cleanly() -> anyhow::Result<()> {
    let mut parlor = ParlorProcess::start()?;
    parlor.wait_healthy(TIMEOUT).await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(parlor.ws_url()).await?;
    parlor.terminate()?;

    // The open socket is closed by the server rather than left hanging.
    let closed = tokio::time::timeout(TIMEOUT, async {
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                break;
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "socket not closed on shutdown");

    let status = parlor.wait_exit(TIMEOUT).await?;
    assert!(status.success(), "exit status: {status}");
    Ok(())
}

#[tokio::test]
async fn sqlite_store_survives_restart() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let url = format!("sqlite://{}", dir.path().join("parlor.db").display());
    let client = reqwest::Client::new();

    let room: Room = {
        let parlor = ParlorProcess::build().database_url(&url).spawn()?;
        parlor.wait_healthy(TIMEOUT).await?;
        client
            .post(format!("{}/api/clients/alice/rooms", parlor.base_url()))
            .json(&json!({ "name": "Durable" }))
            .send()
            .await?
            .json()
            .await?
    };

    let parlor = ParlorProcess::build().database_url(&url).spawn()?;
    parlor.wait_healthy(TIMEOUT).await?;
    let found: Option<Room> = client
        .get(format!("{}/api/rooms/{}", parlor.base_url(), room.id))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(found, Some(room));

    let status: Value = reqwest::get(format!("{}/api/status", parlor.base_url())).await?.json().await?;
    assert_eq!(status["store"], "sqlite");
    Ok(())
}
