// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parlor: real-time multi-room chat over WebSocket and HTTP.

pub mod bus;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod membership;
pub mod messages;
pub mod model;
pub mod rooms;
pub mod session;
pub mod store;
pub mod test_support;
pub mod transport;
pub mod upload;

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::bus::Bus;
use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::store::Store;
use crate::transport::{build_router, AppState};

/// Run the chat server until SIGTERM/SIGINT.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr = config.addr();
    let shutdown = CancellationToken::new();

    let store = Store::open(config.database_url.as_deref())
        .await
        .context("failed to open backing store")?;
    let backend = store.backend_name();

    let bus = Bus::new();
    let relay = match config.nats() {
        Some(nats) => {
            let relay = bus
                .connect_nats(&nats, shutdown.clone())
                .await
                .with_context(|| format!("failed to connect to NATS at {}", nats.url))?;
            info!(subject = %nats.subject(), node = bus.node_id(), "NATS fan-out enabled");
            Some(relay)
        }
        None => None,
    };

    let coordinator = Coordinator::new(store, bus, config.upload_limits());
    let mut state = AppState::new(coordinator, shutdown.clone());
    state.heartbeat_interval = config.heartbeat_interval();
    state.heartbeat_timeout = config.heartbeat_timeout();
    state.cors_origin = config.cors_origin.clone();
    let router = build_router(Arc::new(state));

    spawn_signal_handler(shutdown.clone());

    let listener = TcpListener::bind(&addr).await.with_context(|| format!("failed to bind {addr}"))?;
    info!(store = backend, "parlor listening on {addr}");
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    if let Some(relay) = relay {
        let _ = relay.await;
    }
    info!("parlor stopped");
    Ok(())
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGTERM");
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGINT");
            }
        }
        shutdown.cancel();
    });
}
