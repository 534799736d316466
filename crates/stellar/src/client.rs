//! RPC client library for joining and querying the registry, linked
//! into application services.

use anyhow::Context as _;
use common::Version;
use proto_alioth::alioth_stellar_client::AliothStellarClient;
use proto_alioth::{ServiceDiscoveryRequest, ServiceRegistrationRequest, ServiceUnmountRequest};
use std::time::Duration;

/// A registry client over the binary RPC transport. Connects lazily;
/// every call carries the configured deadline.
#[derive(Clone)]
pub struct Client {
    client: AliothStellarClient<tonic::transport::Channel>,
    timeout: Duration,
}

impl Client {
    pub fn new(addr: &str, timeout: Duration) -> anyhow::Result<Self> {
        let uri = if addr.contains("://") {
            addr.to_string()
        } else {
            format!("http://{addr}")
        };
        let channel = tonic::transport::Endpoint::from_shared(uri)?.connect_lazy();

        Ok(Self {
            client: AliothStellarClient::new(channel),
            timeout,
        })
    }

    /// Register this service's endpoint; answers `(address, handler)`.
    pub async fn register(
        &self,
        service: &str,
        version: Version,
        port: i32,
    ) -> anyhow::Result<(String, String)> {
        let mut client = self.client.clone();
        let request = ServiceRegistrationRequest {
            service: service.to_string(),
            version: version.to_string(),
            port,
        };

        let response = tokio::time::timeout(self.timeout, client.service_registration(request))
            .await
            .context("service registration timed out")?
            .context("failed to register service")?
            .into_inner();
        Ok((response.address, response.name))
    }

    /// Discover a peer at `min_version` or above; answers
    /// `(address, handler)` of one instance, chosen by the registry.
    pub async fn discover(
        &self,
        service: &str,
        min_version: Version,
    ) -> anyhow::Result<(String, String)> {
        let mut client = self.client.clone();
        let request = ServiceDiscoveryRequest {
            service: service.to_string(),
            min_version: min_version.to_string(),
        };

        let response = tokio::time::timeout(self.timeout, client.service_discovery(request))
            .await
            .context("service discovery timed out")?
            .context("failed to discover service")?
            .into_inner();
        Ok((response.address, response.name))
    }

    /// Withdraw a previously registered handler.
    pub async fn unmount(&self, service: &str, handler: &str) -> anyhow::Result<()> {
        let mut client = self.client.clone();
        let request = ServiceUnmountRequest {
            service: service.to_string(),
            name: handler.to_string(),
        };

        tokio::time::timeout(self.timeout, client.service_unmount(request))
            .await
            .context("service unmount timed out")?
            .context("failed to unmount service")?;
        Ok(())
    }
}
