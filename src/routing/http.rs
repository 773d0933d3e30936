//! HTTP Router
//!
//! [`Router`] implementation that POSTs routed envelopes to peers.
//!
//! Called from the distributor thread, so delivery is spawned onto a tokio
//! runtime handle and reported back through the listener once the peer has
//! answered (or all retries are exhausted).

use super::protocol::{ENDPOINT_ROUTE, RouteResponse, RoutedEnvelope};
use super::table::{Resolution, RoutingTable};
use super::{RouteListener, RouteStrategy, Router};
use crate::distribution::protocol::ModifierMessage;
use crate::distribution::types::MessageId;
use crate::index::types::TrieKey;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinSet;

pub const DEFAULT_ROUTE_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_ROUTE_ATTEMPTS: usize = 3;

#[derive(Clone)]
struct Sender {
    http_client: reqwest::Client,
    timeout: Duration,
    attempts: usize,
}

impl Sender {
    async fn post_with_retry(&self, url: String, payload: &RoutedEnvelope) -> Result<reqwest::Response> {
        let mut delay_ms = 150u64;

        for attempt in 0..self.attempts {
            let response = self
                .http_client
                .post(url.clone())
                .json(payload)
                .timeout(self.timeout)
                .send()
                .await;

            match response {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt + 1 == self.attempts {
                        return Err(anyhow::anyhow!(e));
                    }
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(anyhow::anyhow!("Retry attempts exhausted"))
    }

    /// `true` if the peer at `address` accepted the envelope.
    async fn deliver(&self, address: &str, envelope: &RoutedEnvelope) -> bool {
        let url = format!("http://{}{}", address, ENDPOINT_ROUTE);
        match self.post_with_retry(url, envelope).await {
            Ok(resp) if resp.status().is_success() => match resp.json::<RouteResponse>().await {
                Ok(body) => body.accepted,
                Err(e) => {
                    tracing::warn!("Malformed route response from {}: {}", address, e);
                    false
                }
            },
            Ok(resp) => {
                tracing::warn!("Peer {} rejected routed message: {}", address, resp.status());
                false
            }
            Err(e) => {
                tracing::warn!("Failed to reach peer {}: {}", address, e);
                false
            }
        }
    }
}

pub struct HttpRouter {
    table: Arc<RoutingTable>,
    runtime: Handle,
    sender: Sender,
}

impl HttpRouter {
    pub fn new(table: Arc<RoutingTable>, runtime: Handle) -> Self {
        Self::with_retry(table, runtime, DEFAULT_ROUTE_TIMEOUT, DEFAULT_ROUTE_ATTEMPTS)
    }

    pub fn with_retry(
        table: Arc<RoutingTable>,
        runtime: Handle,
        timeout: Duration,
        attempts: usize,
    ) -> Self {
        Self {
            table,
            runtime,
            sender: Sender {
                http_client: reqwest::Client::new(),
                timeout,
                attempts: attempts.max(1),
            },
        }
    }

    pub fn table(&self) -> &Arc<RoutingTable> {
        &self.table
    }

    fn envelope(&self, strategy: RouteStrategy, message: &ModifierMessage) -> Option<RoutedEnvelope> {
        let sender = self.table.local().info().id.clone();
        match RoutedEnvelope::encode(strategy, sender, message) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                tracing::error!("Failed to encode message {}: {:#}", message.id(), e);
                None
            }
        }
    }
}

impl Router for HttpRouter {
    fn route(&self, key: &TrieKey, message: &ModifierMessage, listener: Arc<dyn RouteListener>) {
        let id = message.id().clone();
        let Some(envelope) = self.envelope(RouteStrategy::Greedy, message) else {
            listener.failed(&id);
            return;
        };

        let address = match self.table.resolve(key) {
            Resolution::Local => self.table.local().info().address.clone(),
            Resolution::Remote(peer) => peer.info.address,
            Resolution::Unreachable => {
                tracing::warn!("No peer known for key {}, message {} undeliverable", key, id);
                listener.failed(&id);
                return;
            }
        };

        let sender = self.sender.clone();
        self.runtime.spawn(async move {
            report(&*listener, &id, sender.deliver(&address, &envelope).await);
        });
    }

    fn route_to_replicas(&self, message: &ModifierMessage, listener: Arc<dyn RouteListener>) {
        let id = message.id().clone();
        let replicas = self.table.replicas();
        if replicas.is_empty() {
            listener.finished(&id);
            return;
        }

        let Some(envelope) = self.envelope(RouteStrategy::Replicas, message) else {
            listener.failed(&id);
            return;
        };

        let envelope = Arc::new(envelope);
        let mut deliveries = JoinSet::new();
        for replica in replicas {
            let sender = self.sender.clone();
            let envelope = envelope.clone();
            deliveries.spawn_on(
                async move { sender.deliver(&replica.info.address, &envelope).await },
                &self.runtime,
            );
        }

        self.runtime.spawn(async move {
            let mut accepted = true;
            while let Some(result) = deliveries.join_next().await {
                accepted &= result.unwrap_or(false);
            }
            report(&*listener, &id, accepted);
        });
    }
}

fn report(listener: &dyn RouteListener, id: &MessageId, delivered: bool) {
    if delivered {
        listener.finished(id);
    } else {
        listener.failed(id);
    }
}
