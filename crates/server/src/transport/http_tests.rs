// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::*;
use crate::error::ErrorResponse;
use crate::store::{MemoryStore, Store};
use crate::test_support::StateBuilder;
use crate::transport::build_router;

fn server_with(mem: &MemoryStore) -> anyhow::Result<axum_test::TestServer> {
    let state = StateBuilder::new().store(Store::Memory(mem.clone())).build();
    axum_test::TestServer::new(build_router(state)).map_err(|e| anyhow::anyhow!("create test server: {e}"))
}

#[test]
fn chat_error_renders_error_envelope() {
    let resp = ChatError::upload("no such upload").into_response();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn storage_outage_maps_to_503() -> anyhow::Result<()> {
    let mem = MemoryStore::new();
    let server = server_with(&mem)?;
    mem.set_unavailable(true);

    let resp = server.get("/api/rooms/abc/messages").await;
    resp.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: ErrorResponse = resp.json();
    assert_eq!(body.error.code, "STORAGE_ERROR");
    Ok(())
}

#[tokio::test]
async fn status_reports_degraded_store() -> anyhow::Result<()> {
    let mem = MemoryStore::new();
    let server = server_with(&mem)?;

    let ok: StatusResponse = server.get("/api/status").await.json();
    assert_eq!(ok.status, "running");
    assert_eq!(ok.store, "memory");
    assert_eq!(ok.bus, "local");
    assert_eq!(ok.rooms, Some(0));

    mem.set_unavailable(true);
    let degraded: StatusResponse = server.get("/api/status").await.json();
    assert_eq!(degraded.status, "degraded");
    assert_eq!(degraded.rooms, None);
    Ok(())
}

#[tokio::test]
async fn malformed_body_is_validation_error() -> anyhow::Result<()> {
    let server = server_with(&MemoryStore::new())?;
    let resp = server
        .post("/api/clients/u1/rooms")
        .content_type("application/json")
        .text("{not json")
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: ErrorResponse = resp.json();
    assert_eq!(body.error.code, "VALIDATION_ERROR");
    Ok(())
}

#[tokio::test]
async fn blank_client_id_is_rejected() -> anyhow::Result<()> {
    let server = server_with(&MemoryStore::new())?;
    let resp = server
        .post("/api/rooms/abc/messages")
        .json(&serde_json::json!({ "clientId": "  ", "content": "hi" }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    Ok(())
}
