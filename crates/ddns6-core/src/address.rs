//! Address model
//!
//! [`Address`] is an immutable IP value carrying a derived [`Scope`].
//! [`AddressSet`] is the ordered result of one discovery call, most-preferred
//! first.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

/// Address family tracked by a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    /// Family of an IP address
    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }

    /// Whether `ip` belongs to this family
    pub fn matches(&self, ip: &IpAddr) -> bool {
        Self::of(ip) == *self
    }

    /// DNS record type published for this family
    pub fn record_type(&self) -> &'static str {
        match self {
            AddressFamily::V4 => "A",
            AddressFamily::V6 => "AAAA",
        }
    }

    /// Public anycast destination whose route identifies the egress path
    pub fn probe_target(&self) -> SocketAddr {
        match self {
            AddressFamily::V4 => SocketAddr::new(IpAddr::V4(Ipv4Addr::new(8, 8, 4, 4)), 53),
            AddressFamily::V6 => SocketAddr::new(
                IpAddr::V6(Ipv6Addr::new(0x2001, 0x4860, 0x4860, 0, 0, 0, 0, 0x8844)),
                53,
            ),
        }
    }

    /// Wildcard socket address for binding a local socket of this family
    pub fn unspecified(&self) -> SocketAddr {
        match self {
            AddressFamily::V4 => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            AddressFamily::V6 => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::V4 => f.write_str("IPv4"),
            AddressFamily::V6 => f.write_str("IPv6"),
        }
    }
}

/// Scope classification of an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Publicly routable unicast
    GlobalUnicast,
    /// RFC 1918 (IPv4) or unique local fc00::/7 (IPv6)
    Private,
    Multicast,
    LinkLocal,
    /// Rotating privacy-extension address (RFC 4941)
    Temporary,
    /// Loopback, unspecified or broadcast
    Unroutable,
}

impl Scope {
    /// Classify an address from its bytes alone
    pub fn classify(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => {
                if v4.is_multicast() {
                    Scope::Multicast
                } else if v4.is_link_local() {
                    Scope::LinkLocal
                } else if v4.is_private() {
                    Scope::Private
                } else if v4.is_loopback() || v4.is_unspecified() || v4.is_broadcast() {
                    Scope::Unroutable
                } else {
                    Scope::GlobalUnicast
                }
            }
            IpAddr::V6(v6) => {
                if v6.is_multicast() {
                    Scope::Multicast
                } else if v6.is_unicast_link_local() {
                    Scope::LinkLocal
                } else if v6.is_unique_local() {
                    Scope::Private
                } else if v6.is_loopback() || v6.is_unspecified() {
                    Scope::Unroutable
                } else {
                    Scope::GlobalUnicast
                }
            }
        }
    }
}

/// An immutable discovered address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    ip: IpAddr,
    scope: Scope,
}

impl Address {
    /// Create an address, deriving its scope from the IP bytes
    pub fn new(ip: IpAddr) -> Self {
        Self {
            ip,
            scope: Scope::classify(&ip),
        }
    }

    /// Create an address the kernel flagged as a temporary/privacy address
    pub fn temporary(ip: IpAddr) -> Self {
        Self {
            ip,
            scope: Scope::Temporary,
        }
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn family(&self) -> AddressFamily {
        AddressFamily::of(&self.ip)
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Whether this address may be published in DNS
    pub fn is_global_unicast(&self) -> bool {
        self.scope == Scope::GlobalUnicast
    }

    /// Whether both addresses share the leading `bits` of their prefix.
    /// Addresses of different families never share a prefix.
    pub fn shares_prefix(&self, other: &Address, bits: u8) -> bool {
        match (self.ip, other.ip) {
            (IpAddr::V4(a), IpAddr::V4(b)) => {
                let bits = u32::from(bits.min(32));
                let mask = if bits == 0 { 0 } else { u32::MAX << (32 - bits) };
                (u32::from(a) & mask) == (u32::from(b) & mask)
            }
            (IpAddr::V6(a), IpAddr::V6(b)) => {
                let bits = u32::from(bits.min(128));
                let mask = if bits == 0 { 0 } else { u128::MAX << (128 - bits) };
                (u128::from(a) & mask) == (u128::from(b) & mask)
            }
            _ => false,
        }
    }
}

impl From<IpAddr> for Address {
    fn from(ip: IpAddr) -> Self {
        Self::new(ip)
    }
}

impl FromStr for Address {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<IpAddr>().map(Self::new)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.ip.fmt(f)
    }
}

/// Ordered candidates from one discovery call, most-preferred first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressSet(Vec<Address>);

impl AddressSet {
    pub fn new(addresses: Vec<Address>) -> Self {
        Self(addresses)
    }

    pub fn singleton(address: Address) -> Self {
        Self(vec![address])
    }

    /// The address that should be published
    pub fn preferred(&self) -> Option<&Address> {
        self.0.first()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Address> {
        self.0.iter()
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.0.iter().any(|a| a.ip == *ip)
    }

    pub fn into_vec(self) -> Vec<Address> {
        self.0
    }
}

impl From<Vec<Address>> for AddressSet {
    fn from(addresses: Vec<Address>) -> Self {
        Self(addresses)
    }
}

impl fmt::Display for AddressSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, address) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            address.fmt(f)?;
        }
        f.write_str("]")
    }
}
