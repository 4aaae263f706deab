// # STUN Address Source
//
// This crate discovers the host's public address by asking a STUN server
// which source address it saw.
//
// ## Purpose
//
// Works on any platform and sees through NAT, so it is the usual choice for
// IPv4 behind a home router. Each discovery is one Binding request/response
// over the requested family's transport.
//
// ## Architecture
//
// - Resolve the server name, keeping only addresses of the requested family
// - Connect a UDP socket and send one Binding Request
// - Accept only the response carrying our transaction id
// - XOR-MAPPED-ADDRESS, falling back to MAPPED-ADDRESS, is the answer
//
// Lost datagrams surface as a timeout; the pipeline's retry scheduler owns
// any retransmission.

pub mod codec;

use async_trait::async_trait;
use codec::CodecError;
use ddns6_core::{Address, AddressFamily, AddressSet, AddressSource, Error, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::debug;

/// Default wait for a Binding response
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Largest response we accept
const MAX_RESPONSE_SIZE: usize = 1024;

/// STUN-based address source
#[derive(Debug, Clone)]
pub struct StunSource {
    /// STUN server as `host:port`
    server: String,
    /// Wait for a matching response
    timeout: Duration,
}

impl StunSource {
    /// Create a source querying `server` (`host:port`)
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create with a custom response timeout
    pub fn with_timeout(server: impl Into<String>, timeout: Duration) -> Self {
        Self {
            server: server.into(),
            timeout,
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Resolve the server to an address of `family`
    async fn resolve(&self, family: AddressFamily) -> Result<SocketAddr> {
        let mut addresses = tokio::net::lookup_host(&self.server)
            .await
            .map_err(|e| Error::discovery(format!("resolve {}: {}", self.server, e)))?;

        addresses
            .find(|addr| family.matches(&addr.ip()))
            .ok_or_else(|| {
                Error::discovery(format!("{} has no {} address", self.server, family))
            })
    }
}

#[async_trait]
impl AddressSource for StunSource {
    async fn discover(&self, family: AddressFamily) -> Result<AddressSet> {
        let server = self.resolve(family).await?;

        let socket = UdpSocket::bind(family.unspecified())
            .await
            .map_err(|e| Error::discovery(format!("STUN bind: {}", e)))?;
        socket
            .connect(server)
            .await
            .map_err(|e| Error::discovery(format!("STUN dial {}: {}", server, e)))?;

        let transaction_id = codec::transaction_id();
        socket
            .send(&codec::encode_binding_request(&transaction_id))
            .await
            .map_err(|e| Error::discovery(format!("STUN send to {}: {}", server, e)))?;

        let deadline = Instant::now() + self.timeout;
        let mut buf = [0u8; MAX_RESPONSE_SIZE];

        let ip = loop {
            let len = tokio::time::timeout_at(deadline, socket.recv(&mut buf))
                .await
                .map_err(|_| {
                    Error::discovery(format!("STUN server {} did not answer", server))
                })?
                .map_err(|e| Error::discovery(format!("STUN receive from {}: {}", server, e)))?;

            match codec::decode_binding_response(&buf[..len], &transaction_id) {
                Ok(ip) => break ip,
                // Stray or stale datagram; keep waiting for ours
                Err(CodecError::TransactionMismatch) => {
                    debug!("Ignoring STUN response with foreign transaction id");
                }
                Err(e) => {
                    return Err(Error::discovery(format!("STUN response from {}: {}", server, e)));
                }
            }
        };

        if !family.matches(&ip) {
            return Err(Error::discovery(format!(
                "STUN server {} mapped us to {}, expected {}",
                server, ip, family
            )));
        }

        debug!("STUN server {} sees {}", server, ip);
        Ok(AddressSet::singleton(Address::new(ip)))
    }

    fn name(&self) -> &'static str {
        "stun"
    }
}
