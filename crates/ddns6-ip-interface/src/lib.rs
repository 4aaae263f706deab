// # Interface Address Source
//
// Discovers publishable addresses by enumerating local interfaces and asking
// the kernel which source address it uses for outbound traffic.
//
// ## Ranking
//
// 1. Keep global-unicast candidates of the requested family (private,
//    link-local, multicast and loopback are dropped)
// 2. The egress-probe address goes first when it passes the same filter
// 3. The rest keep enumeration order, minus duplicates
// 4. With `PrefixPolicy::SamePrefix` and a global egress address, candidates
//    outside its /64 (IPv6) or /24 (IPv4) are dropped too
// 5. When nothing survives, the egress address alone is returned
//
// ## Platform Support
//
// Enumeration goes through `if-addrs` (getifaddrs on Unix, the IP Helper API
// on Windows).

mod enumerate;
mod probe;

pub use enumerate::{InterfaceEnumerator, SystemInterfaces};
pub use probe::{EgressProbe, UdpEgressProbe};

use async_trait::async_trait;
use ddns6_core::{Address, AddressFamily, AddressSet, AddressSource, PrefixPolicy, Result};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

/// Interface-enumeration address source
pub struct InterfaceSource {
    enumerator: Arc<dyn InterfaceEnumerator>,
    probe: Arc<dyn EgressProbe>,
    policy: PrefixPolicy,
}

impl InterfaceSource {
    /// Source backed by the host's interfaces and a UDP egress probe
    pub fn new(policy: PrefixPolicy) -> Self {
        Self::with_parts(
            Arc::new(SystemInterfaces),
            Arc::new(UdpEgressProbe::new()),
            policy,
        )
    }

    pub fn with_parts(
        enumerator: Arc<dyn InterfaceEnumerator>,
        probe: Arc<dyn EgressProbe>,
        policy: PrefixPolicy,
    ) -> Self {
        Self {
            enumerator,
            probe,
            policy,
        }
    }
}

#[async_trait]
impl AddressSource for InterfaceSource {
    async fn discover(&self, family: AddressFamily) -> Result<AddressSet> {
        let candidates = self.enumerator.addresses()?;
        let egress = self.probe.egress(family).await?;

        let set = rank(candidates, egress, family, self.policy);
        debug!("Interface candidates for {}: {}", family, set);
        Ok(set)
    }

    fn name(&self) -> &'static str {
        "interface"
    }
}

/// Order interface candidates around the egress address
///
/// The egress address leads only when it is itself publishable. A private or
/// link-local egress address is dropped like any other candidate and the
/// prefix filter is skipped.
pub fn rank(
    candidates: impl IntoIterator<Item = IpAddr>,
    egress: IpAddr,
    family: AddressFamily,
    policy: PrefixPolicy,
) -> AddressSet {
    let egress = Address::new(egress);
    let egress_publishable = family.matches(&egress.ip()) && egress.is_global_unicast();
    let prefix_bits = match family {
        AddressFamily::V4 => 24,
        AddressFamily::V6 => 64,
    };

    let mut ranked: Vec<Address> = Vec::new();
    if egress_publishable {
        ranked.push(egress);
    }

    for ip in candidates {
        if !family.matches(&ip) {
            continue;
        }
        let address = Address::new(ip);
        if !address.is_global_unicast() || ranked.contains(&address) {
            continue;
        }
        if egress_publishable
            && policy == PrefixPolicy::SamePrefix
            && !address.shares_prefix(&egress, prefix_bits)
        {
            continue;
        }
        ranked.push(address);
    }

    if ranked.is_empty() {
        debug!(
            "No publishable {} interface candidates, using egress address {}",
            family, egress
        );
        ranked.push(egress);
    }

    AddressSet::new(ranked)
}
