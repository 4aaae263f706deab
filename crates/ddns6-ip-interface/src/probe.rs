// Egress probe
//
// Connecting a UDP socket sends nothing on the wire, but makes the kernel pick
// a route and a source address. That source address is the one the host uses
// to reach the internet for the family.

use async_trait::async_trait;
use ddns6_core::{AddressFamily, Error, Result};
use std::net::{IpAddr, SocketAddr};
use tokio::net::UdpSocket;
use tracing::debug;

/// Finds the local address used for outbound traffic
#[async_trait]
pub trait EgressProbe: Send + Sync {
    async fn egress(&self, family: AddressFamily) -> Result<IpAddr>;
}

/// Connected-UDP egress probe
#[derive(Debug, Clone, Default)]
pub struct UdpEgressProbe {
    target: Option<SocketAddr>,
}

impl UdpEgressProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe toward `target` instead of the family's default anycast destination
    pub fn with_target(target: SocketAddr) -> Self {
        Self {
            target: Some(target),
        }
    }
}

#[async_trait]
impl EgressProbe for UdpEgressProbe {
    async fn egress(&self, family: AddressFamily) -> Result<IpAddr> {
        let target = self.target.unwrap_or_else(|| family.probe_target());

        let socket = UdpSocket::bind(family.unspecified())
            .await
            .map_err(|e| Error::discovery(format!("egress probe bind: {}", e)))?;
        socket
            .connect(target)
            .await
            .map_err(|e| Error::discovery(format!("egress probe toward {}: {}", target, e)))?;
        let local = socket
            .local_addr()
            .map_err(|e| Error::discovery(format!("egress probe local address: {}", e)))?;

        debug!("Egress {} address via {}: {}", family, target, local.ip());
        Ok(local.ip())
    }
}
