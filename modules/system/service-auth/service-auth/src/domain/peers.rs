//! Best-effort propagation of token invalidation to other gateway nodes.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use service_auth_sdk::{
    InvalidationReport, PeerError, PeerInvalidationClient, RegistryError, ServiceInstance,
    ServiceRegistryClient,
};

use crate::config::ClusterConfig;

/// Fans invalidations out to every live gateway peer except this node.
pub struct PeerNotifier {
    registry: Arc<dyn ServiceRegistryClient>,
    client: Arc<dyn PeerInvalidationClient>,
    gateway_service_id: String,
    own_instance_id: String,
    timeout: Duration,
    concurrency: usize,
}

impl PeerNotifier {
    #[must_use]
    pub fn new(
        registry: Arc<dyn ServiceRegistryClient>,
        client: Arc<dyn PeerInvalidationClient>,
        cluster: &ClusterConfig,
    ) -> Self {
        Self {
            registry,
            client,
            gateway_service_id: cluster.gateway_service_id.clone(),
            own_instance_id: cluster.instance_id.clone(),
            timeout: cluster.peer_timeout(),
            concurrency: cluster.peer_concurrency.max(1),
        }
    }

    /// Live gateway instances other than this node.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the registry cannot be queried.
    pub async fn peers(&self) -> Result<Vec<ServiceInstance>, RegistryError> {
        let instances = self
            .registry
            .get_instances(&self.gateway_service_id)
            .await?;
        Ok(instances
            .into_iter()
            .filter(|i| i.instance_id != self.own_instance_id)
            .collect())
    }

    /// Send `token` to every peer in parallel. Never fails: unreachable peers are reported.
    #[tracing::instrument(skip_all, fields(gateway_service_id = %self.gateway_service_id))]
    pub async fn broadcast(&self, token: &str) -> InvalidationReport {
        let peers = match self.peers().await {
            Ok(peers) => peers,
            Err(e) => {
                tracing::warn!(error = %e, "cannot enumerate gateway peers, invalidation stays local");
                return InvalidationReport::default();
            }
        };

        let outcomes: Vec<(String, Result<(), PeerError>)> = futures::stream::iter(peers)
            .map(|peer| async move {
                let outcome = self.call(&peer, token).await;
                (peer.instance_id, outcome)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = InvalidationReport::default();
        for (instance_id, outcome) in outcomes {
            match outcome {
                Ok(()) => report.notified.push(instance_id),
                Err(e) => {
                    tracing::warn!(instance_id = %instance_id, error = %e, "gateway peer unreachable");
                    report.unreachable.push(instance_id);
                }
            }
        }
        report.notified.sort();
        report.unreachable.sort();
        report
    }

    /// Send every token in `tokens` to `peer`, in parallel. Returns the number acknowledged.
    pub async fn replay(&self, peer: &ServiceInstance, tokens: Vec<String>) -> usize {
        futures::stream::iter(tokens)
            .map(|token| async move { self.call(peer, &token).await })
            .buffer_unordered(self.concurrency)
            .filter(|outcome| {
                if let Err(e) = outcome {
                    tracing::warn!(instance_id = %peer.instance_id, error = %e, "catch-up invalidation failed");
                }
                futures::future::ready(outcome.is_ok())
            })
            .count()
            .await
    }

    async fn call(&self, peer: &ServiceInstance, token: &str) -> Result<(), PeerError> {
        tokio::time::timeout(self.timeout, self.client.invalidate(peer, token))
            .await
            .unwrap_or(Err(PeerError::Timeout))
    }
}
