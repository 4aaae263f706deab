// # Address Source Trait
//
// Defines the interface for discovering the host's publishable addresses.
//
// ## Implementations
//
// - Interface enumeration + egress probe: `ddns6-ip-interface` crate
// - Kernel routing table (Linux): `ddns6-ip-netlink` crate
// - External STUN server: `ddns6-ip-stun` crate
//
// ## Usage
//
// ```rust,ignore
// use ddns6_core::{AddressFamily, AddressSource};
//
// #[tokio::main]
// async fn main() -> ddns6_core::Result<()> {
//     let source = /* AddressSource implementation */;
//
//     let candidates = source.discover(AddressFamily::V6).await?;
//     println!("preferred: {:?}", candidates.preferred());
//
//     Ok(())
// }
// ```

use crate::address::{AddressFamily, AddressSet};
use async_trait::async_trait;

/// Trait for address discovery strategies
///
/// One strategy is bound at startup and never switched at runtime; strategies
/// are not fallbacks for one another.
///
/// # Contract
///
/// - Returns a non-empty [`AddressSet`] ordered most-preferred first
/// - Returns `Error::NoAddressFound` when nothing qualifies, never an empty set
/// - Returns `Error::Discovery` on probe, dial, protocol or OS query failures
/// - Every returned address matches the requested family
///
/// # Trust Level: Semi-Trusted
///
/// ## Allowed Capabilities
/// - ✅ Perform platform-specific I/O (sockets, netlink, getifaddrs)
/// - ✅ Filter and rank candidates
///
/// ## Forbidden Capabilities
/// - ❌ Perform DNS updates (use `DnsProvider`)
/// - ❌ Implement retry logic (owned by `RetryScheduler`)
/// - ❌ Cache results between calls (each call re-reads current state)
/// - ❌ Fall back to another strategy on failure
///
/// ## Rationale
///
/// Sources are **observers**, not **decision-makers**. Every discovery re-reads
/// live system state, which is what makes coalescing change events safe.
#[async_trait]
pub trait AddressSource: Send + Sync {
    /// Discover candidate addresses for `family`
    async fn discover(&self, family: AddressFamily) -> Result<AddressSet, crate::Error>;

    /// Strategy name (for logging)
    fn name(&self) -> &'static str;
}
