// # Netlink Address Source
//
// This crate reads publishable addresses straight from the kernel's routing
// tables and turns kernel address-change notifications into pipeline
// wake-ups.
//
// ## Discovery
//
// 1. `RTM_GETROUTE` toward a fixed public destination finds the output interface
// 2. `RTM_GETADDR` dumps that interface's addresses for the family
// 3. Temporary (privacy) addresses are dropped
// 4. Remaining global-unicast addresses are sorted by descending preferred lifetime
//
// ## Change Notification
//
// A socket bound to `RTMGRP_IPV4_IFADDR | RTMGRP_IPV6_IFADDR` receives every
// address add/remove. Datagram contents are ignored: each one only signals
// that discovery should run again.
//
// ## Platform Support
//
// Netlink is Linux-only. On other targets both types exist but fail with a
// configuration error, so a daemon built elsewhere still rejects the strategy
// cleanly at startup.

#[cfg(target_os = "linux")]
mod linux;

use async_trait::async_trait;
use ddns6_core::{
    Address, AddressFamily, AddressSet, AddressSource, ChangeNotifier, ChangeStream, Error, Result,
};
use std::net::IpAddr;
use tokio_util::sync::CancellationToken;

/// One address reported by the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelAddress {
    pub ip: IpAddr,
    /// `IFA_F_TEMPORARY` was set in the header or `IFA_FLAGS`
    pub temporary: bool,
    /// Preferred lifetime in seconds; `u32::MAX` means forever
    pub preferred_lifetime: u32,
}

/// Filter and order kernel addresses for publication
///
/// Drops temporary addresses, other families and anything that is not global
/// unicast, then sorts by descending preferred lifetime. The sort is stable, so
/// ties keep kernel order.
pub fn rank(addresses: Vec<KernelAddress>, family: AddressFamily) -> Vec<Address> {
    let mut kept: Vec<KernelAddress> = addresses
        .into_iter()
        .filter(|a| !a.temporary && family.matches(&a.ip))
        .filter(|a| Address::new(a.ip).is_global_unicast())
        .collect();

    kept.sort_by(|a, b| b.preferred_lifetime.cmp(&a.preferred_lifetime));
    kept.into_iter().map(|a| Address::new(a.ip)).collect()
}

/// Netlink-based address source
#[derive(Debug, Clone, Copy, Default)]
pub struct NetlinkSource;

impl NetlinkSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AddressSource for NetlinkSource {
    #[cfg(target_os = "linux")]
    async fn discover(&self, family: AddressFamily) -> Result<AddressSet> {
        let mut socket = linux::RouteSocket::open()?;
        let index = socket.egress_interface(family).await?;
        let addresses = socket.interface_addresses(family, index).await?;

        tracing::debug!(
            "Interface {} reports {} {} address(es)",
            index,
            addresses.len(),
            family
        );

        let ranked = rank(addresses, family);
        if ranked.is_empty() {
            return Err(Error::NoAddressFound(family));
        }
        Ok(AddressSet::new(ranked))
    }

    #[cfg(not(target_os = "linux"))]
    async fn discover(&self, _family: AddressFamily) -> Result<AddressSet> {
        Err(Error::config("Netlink address source is only supported on Linux"))
    }

    fn name(&self) -> &'static str {
        "netlink"
    }
}

/// Kernel address-change notifier
///
/// Each subscription owns its own socket and channel.
#[derive(Debug, Clone, Copy)]
pub struct NetlinkNotifier {
    capacity: usize,
}

impl NetlinkNotifier {
    /// Notifier whose subscriptions hold at most `capacity` pending wake-ups
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
        }
    }
}

impl Default for NetlinkNotifier {
    fn default() -> Self {
        Self::new(1)
    }
}

#[async_trait]
impl ChangeNotifier for NetlinkNotifier {
    #[cfg(target_os = "linux")]
    async fn subscribe(&self, cancel: CancellationToken) -> Result<ChangeStream> {
        let socket = linux::subscribe_socket()?;
        let (sender, stream) = ddns6_core::change_channel(self.capacity);
        tokio::spawn(linux::forward_changes(socket, sender, cancel));
        Ok(stream)
    }

    #[cfg(not(target_os = "linux"))]
    async fn subscribe(&self, _cancel: CancellationToken) -> Result<ChangeStream> {
        Err(Error::config("Netlink notifications are only supported on Linux"))
    }
}
