// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Room- and identity-scoped event fan-out.
//!
//! Each connection owns a bounded outbox. Publishing walks the local
//! subscriber table and pushes into every matching outbox in call order, then
//! forwards the event over the optional NATS link so other processes can do
//! the same for their own connections.
//!
//! Publishing never waits on a slow reader. An outbox that fills up is marked
//! overflowed, dropped from the table, and its connection is expected to
//! disconnect.

pub mod nats;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::event::{Scope, ServerEvent};
use nats::{Envelope, NatsConfig, NatsLink};

/// Events a connection may fall behind by before it is evicted.
pub const OUTBOX_CAPACITY: usize = 1024;

/// Per-connection outbound channel.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::Sender<ServerEvent>,
    overflow: CancellationToken,
}

impl Outbox {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, overflow: CancellationToken::new() }, rx)
    }

    /// Queue `event` without waiting. Returns `false` when the receiver is
    /// gone or the outbox has overflowed; a full queue marks it overflowed.
    pub fn push(&self, event: ServerEvent) -> bool {
        if self.overflow.is_cancelled() {
            return false;
        }
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.overflow.cancel();
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Cancelled once the outbox overflows.
    pub fn overflow_token(&self) -> CancellationToken {
        self.overflow.clone()
    }

    pub fn is_overflowed(&self) -> bool {
        self.overflow.is_cancelled()
    }
}

type SubscriberTable = HashMap<Scope, HashMap<String, Outbox>>;

#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

struct BusInner {
    node_id: String,
    subscribers: Mutex<SubscriberTable>,
    link: OnceLock<NatsLink>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                node_id: uuid::Uuid::new_v4().to_string(),
                subscribers: Mutex::new(HashMap::new()),
                link: OnceLock::new(),
            }),
        }
    }

    /// Unique id of this process on the NATS link.
    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    /// Connect to NATS and start relaying remote envelopes to local subscribers.
    pub async fn connect_nats(
        &self,
        config: &NatsConfig,
        shutdown: CancellationToken,
    ) -> anyhow::Result<JoinHandle<()>> {
        let link = NatsLink::connect(config).await?;
        let relay = nats::spawn_relay(self.clone(), &link, shutdown).await?;
        if self.inner.link.set(link).is_err() {
            anyhow::bail!("NATS link already attached");
        }
        Ok(relay)
    }

    /// Short description of the fan-out mode, for status reporting.
    pub fn mode(&self) -> &'static str {
        if self.inner.link.get().is_some() {
            "nats"
        } else {
            "local"
        }
    }

    pub fn subscribe(&self, scope: Scope, conn_id: &str, outbox: Outbox) {
        trace!(%scope, conn_id, "subscribe");
        self.inner.subscribers.lock().entry(scope).or_default().insert(conn_id.to_owned(), outbox);
    }

    pub fn unsubscribe(&self, scope: &Scope, conn_id: &str) {
        trace!(%scope, conn_id, "unsubscribe");
        let mut table = self.inner.subscribers.lock();
        if let Some(subs) = table.get_mut(scope) {
            subs.remove(conn_id);
            if subs.is_empty() {
                table.remove(scope);
            }
        }
    }

    /// Drop every subscription held by `conn_id`.
    pub fn unsubscribe_all(&self, conn_id: &str) {
        let mut table = self.inner.subscribers.lock();
        table.retain(|_, subs| {
            subs.remove(conn_id);
            !subs.is_empty()
        });
    }

    /// Number of local connections subscribed to `scope`.
    pub fn subscriber_count(&self, scope: &Scope) -> usize {
        self.inner.subscribers.lock().get(scope).map_or(0, HashMap::len)
    }

    /// Deliver locally, then forward to other processes. Never fails.
    pub async fn publish(&self, scope: Scope, event: ServerEvent) {
        let delivered = self.deliver_local(&scope, &event);
        trace!(%scope, kind = event.kind(), delivered, "published");

        if let Some(link) = self.inner.link.get() {
            let envelope = Envelope { origin: self.inner.node_id.clone(), scope, event };
            link.publish(&envelope).await;
        }
    }

    /// Push `event` into every local outbox for `scope`. Outboxes whose
    /// receiver is gone or that overflowed are pruned. Returns the number of
    /// deliveries.
    pub(crate) fn deliver_local(&self, scope: &Scope, event: &ServerEvent) -> usize {
        let mut table = self.inner.subscribers.lock();
        let Some(subs) = table.get_mut(scope) else {
            return 0;
        };
        let mut delivered = 0;
        subs.retain(|conn_id, outbox| {
            if outbox.push(event.clone()) {
                delivered += 1;
                return true;
            }
            if outbox.is_overflowed() {
                warn!(conn_id = conn_id.as_str(), %scope, "outbox overflowed, dropping subscriber");
            } else {
                debug!(conn_id = conn_id.as_str(), %scope, "pruning closed outbox");
            }
            false
        });
        if subs.is_empty() {
            table.remove(scope);
        }
        delivered
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
