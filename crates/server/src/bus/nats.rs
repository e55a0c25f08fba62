// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-process fan-out over NATS.
//!
//! Every process publishes its events to `{prefix}.events` wrapped in an
//! [`Envelope`] and subscribes to the same subject. Envelopes carrying the
//! local node id are ignored since they were already delivered locally.

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Bus;
use crate::event::{Scope, ServerEvent};

/// NATS connection settings.
#[derive(Debug, Clone)]
pub struct NatsConfig {
    pub url: String,
    pub token: Option<String>,
    pub prefix: String,
}

impl NatsConfig {
    pub fn subject(&self) -> String {
        format!("{}.events", self.prefix)
    }
}

/// Wire payload on `{prefix}.events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub origin: String,
    pub scope: Scope,
    pub event: ServerEvent,
}

pub struct NatsLink {
    client: async_nats::Client,
    subject: String,
}

impl NatsLink {
    pub async fn connect(config: &NatsConfig) -> anyhow::Result<Self> {
        let mut opts = async_nats::ConnectOptions::new();
        if let Some(ref token) = config.token {
            opts = opts.token(token.clone());
        }
        opts = opts.retry_on_initial_connect();

        info!(url = %config.url, prefix = %config.prefix, "connecting NATS link");
        let client = opts.connect(&config.url).await?;
        info!("NATS link connected");

        Ok(Self { client, subject: config.subject() })
    }

    pub(crate) async fn publish(&self, envelope: &Envelope) {
        let json = match serde_json::to_vec(envelope) {
            Ok(json) => json,
            Err(e) => {
                warn!("NATS envelope encode failed: {e}");
                return;
            }
        };
        if let Err(e) = self.client.publish(self.subject.clone(), json.into()).await {
            warn!(scope = %envelope.scope, "NATS publish failed: {e}");
        }
    }
}

/// Subscribe to the events subject and spawn the relay loop.
///
/// The subscription is established before this returns so no envelope
/// published afterwards is missed.
pub(crate) async fn spawn_relay(
    bus: Bus,
    link: &NatsLink,
    shutdown: CancellationToken,
) -> anyhow::Result<JoinHandle<()>> {
    let mut sub = link.client.subscribe(link.subject.clone()).await?;
    link.client.flush().await?;
    let subject = link.subject.clone();
    debug!(%subject, "NATS relay subscribed");

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                msg = sub.next() => {
                    let Some(msg) = msg else { break };
                    relay_one(&bus, &msg.payload);
                }
            }
        }
        debug!(%subject, "NATS relay shutting down");
    }))
}

fn relay_one(bus: &Bus, payload: &[u8]) {
    let envelope: Envelope = match serde_json::from_slice(payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("NATS relay: undecodable envelope: {e}");
            return;
        }
    };
    if envelope.origin == bus.node_id() {
        return;
    }
    let delivered = bus.deliver_local(&envelope.scope, &envelope.event);
    tracing::trace!(
        scope = %envelope.scope,
        origin = %envelope.origin,
        kind = envelope.event.kind(),
        delivered,
        "relayed remote event"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_uses_prefix() {
        let config = NatsConfig { url: "nats://x".to_owned(), token: None, prefix: "parlor".to_owned() };
        assert_eq!(config.subject(), "parlor.events");
    }

    #[test]
    fn relay_skips_own_origin() -> anyhow::Result<()> {
        let bus = Bus::new();
        let (tx, mut rx) = crate::bus::Outbox::channel(8);
        let scope = Scope::Room("R".to_owned());
        bus.subscribe(scope.clone(), "c1", tx);

        let own = Envelope { origin: bus.node_id().to_owned(), scope: scope.clone(), event: ServerEvent::Pong {} };
        relay_one(&bus, &serde_json::to_vec(&own)?);
        assert!(rx.try_recv().is_err());

        let remote = Envelope { origin: "other-node".to_owned(), scope, event: ServerEvent::Pong {} };
        relay_one(&bus, &serde_json::to_vec(&remote)?);
        assert_eq!(rx.try_recv()?, ServerEvent::Pong {});
        Ok(())
    }

    #[test]
    fn relay_ignores_garbage() {
        let bus = Bus::new();
        relay_one(&bus, b"not json");
    }
}
