// rtnetlink socket plumbing

use crate::KernelAddress;
use ddns6_core::{AddressFamily, ChangeSender, Error, Result};
use netlink_packet_core::{NLM_F_DUMP, NLM_F_REQUEST, NetlinkMessage, NetlinkPayload};
use netlink_packet_route::nlas::address::Nla as AddressNla;
use netlink_packet_route::nlas::route::Nla as RouteNla;
use netlink_packet_route::{AddressMessage, RouteMessage, RtnlMessage};
use netlink_sys::protocols::NETLINK_ROUTE;
use netlink_sys::{AsyncSocket, AsyncSocketExt, SocketAddr, TokioSocket};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

const IFA_F_TEMPORARY: u32 = 0x01;
const RTMGRP_IPV4_IFADDR: u32 = 0x10;
const RTMGRP_IPV6_IFADDR: u32 = 0x100;

fn af(family: AddressFamily) -> u8 {
    match family {
        AddressFamily::V4 => libc::AF_INET as u8,
        AddressFamily::V6 => libc::AF_INET6 as u8,
    }
}

fn netlink_error(context: &str, e: impl std::fmt::Display) -> Error {
    Error::discovery(format!("netlink {}: {}", context, e))
}

/// Request/response rtnetlink socket
pub(crate) struct RouteSocket {
    socket: TokioSocket,
    sequence: u32,
}

impl RouteSocket {
    pub(crate) fn open() -> Result<Self> {
        let mut socket = TokioSocket::new(NETLINK_ROUTE).map_err(|e| netlink_error("socket", e))?;
        socket
            .socket_mut()
            .bind_auto()
            .map_err(|e| netlink_error("bind", e))?;
        socket
            .socket_mut()
            .connect(&SocketAddr::new(0, 0))
            .map_err(|e| netlink_error("connect", e))?;
        Ok(Self {
            socket,
            sequence: 0,
        })
    }

    /// Output interface index of the route toward the family's probe target
    pub(crate) async fn egress_interface(&mut self, family: AddressFamily) -> Result<u32> {
        let target = family.probe_target().ip();

        let mut request = RouteMessage::default();
        request.header.address_family = af(family);
        request.header.destination_prefix_length = match target {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        request.nlas.push(RouteNla::Destination(match target {
            IpAddr::V4(v4) => v4.octets().to_vec(),
            IpAddr::V6(v6) => v6.octets().to_vec(),
        }));

        let replies = self
            .request(RtnlMessage::GetRoute(request), NLM_F_REQUEST)
            .await?;

        replies
            .iter()
            .find_map(|reply| match reply {
                RtnlMessage::NewRoute(route) => route.nlas.iter().find_map(|nla| match nla {
                    RouteNla::Oif(index) => Some(*index),
                    _ => None,
                }),
                _ => None,
            })
            .ok_or_else(|| Error::discovery(format!("no route toward {}", target)))
    }

    /// Every `family` address on interface `index`
    pub(crate) async fn interface_addresses(
        &mut self,
        family: AddressFamily,
        index: u32,
    ) -> Result<Vec<KernelAddress>> {
        let mut request = AddressMessage::default();
        request.header.family = af(family);

        let replies = self
            .request(RtnlMessage::GetAddress(request), NLM_F_REQUEST | NLM_F_DUMP)
            .await?;

        Ok(replies
            .iter()
            .filter_map(|reply| match reply {
                RtnlMessage::NewAddress(message)
                    if message.header.index == index && message.header.family == af(family) =>
                {
                    kernel_address(message)
                }
                _ => None,
            })
            .collect())
    }

    async fn request(&mut self, message: RtnlMessage, flags: u16) -> Result<Vec<RtnlMessage>> {
        self.sequence = self.sequence.wrapping_add(1);

        let mut packet = NetlinkMessage::from(message);
        packet.header.flags = flags;
        packet.header.sequence_number = self.sequence;
        packet.finalize();

        let mut buf = vec![0u8; packet.buffer_len()];
        packet.serialize(&mut buf[..]);

        self.socket
            .send(&buf)
            .await
            .map_err(|e| netlink_error("send", e))?;

        let dump = flags & NLM_F_DUMP == NLM_F_DUMP;
        let mut replies = Vec::new();

        loop {
            let (data, _) = self
                .socket
                .recv_from_full()
                .await
                .map_err(|e| netlink_error("recv", e))?;

            let mut offset = 0;
            while offset < data.len() {
                let reply = NetlinkMessage::<RtnlMessage>::deserialize(&data[offset..])
                    .map_err(|e| netlink_error("decode", e))?;
                let length = reply.header.length as usize;

                if reply.header.sequence_number == self.sequence {
                    match reply.payload {
                        NetlinkPayload::InnerMessage(inner) => {
                            replies.push(inner);
                            if !dump {
                                return Ok(replies);
                            }
                        }
                        NetlinkPayload::Done(_) => return Ok(replies),
                        NetlinkPayload::Error(e) => {
                            return Err(netlink_error("request", format!("{:?}", e)));
                        }
                        _ => {}
                    }
                }

                if length == 0 {
                    break;
                }
                offset += (length + 3) & !3;
            }
        }
    }
}

/// Extract the address, temporary flag and preferred lifetime of one RTM_NEWADDR
fn kernel_address(message: &AddressMessage) -> Option<KernelAddress> {
    let mut local = None;
    let mut address = None;
    let mut temporary = u32::from(message.header.flags) & IFA_F_TEMPORARY != 0;
    let mut preferred_lifetime = u32::MAX;

    for nla in &message.nlas {
        match nla {
            AddressNla::Local(bytes) => local = ip_from_bytes(bytes),
            AddressNla::Address(bytes) => address = ip_from_bytes(bytes),
            AddressNla::Flags(flags) => temporary |= flags & IFA_F_TEMPORARY != 0,
            AddressNla::CacheInfo(bytes) => {
                // struct ifa_cacheinfo starts with ifa_prefered
                if let Some(head) = bytes.get(..4) {
                    preferred_lifetime = u32::from_ne_bytes([head[0], head[1], head[2], head[3]]);
                }
            }
            _ => {}
        }
    }

    // IFA_LOCAL is the interface's own address on point-to-point links
    let ip = local.or(address)?;
    Some(KernelAddress {
        ip,
        temporary,
        preferred_lifetime,
    })
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

/// Socket subscribed to IPv4 and IPv6 address changes
pub(crate) fn subscribe_socket() -> Result<TokioSocket> {
    let mut socket = TokioSocket::new(NETLINK_ROUTE)
        .map_err(|e| Error::config(format!("netlink subscription socket: {}", e)))?;
    socket
        .socket_mut()
        .bind(&SocketAddr::new(0, RTMGRP_IPV4_IFADDR | RTMGRP_IPV6_IFADDR))
        .map_err(|e| Error::config(format!("netlink subscription bind: {}", e)))?;
    Ok(socket)
}

/// Forward change datagrams as wake-ups until cancelled
///
/// Dropping the socket on return releases the subscription.
pub(crate) async fn forward_changes(
    socket: TokioSocket,
    sender: ChangeSender,
    cancel: CancellationToken,
) {
    debug!("Netlink change subscription started");

    loop {
        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            received = socket.recv_from_full() => received,
        };

        match received {
            Ok(_) => {
                if !sender.notify() {
                    debug!("Change receiver dropped, ending subscription");
                    break;
                }
            }
            // The kernel dropped notifications; a rescan covers whatever was lost
            Err(e) if e.raw_os_error() == Some(libc::ENOBUFS) => {
                warn!("Netlink receive buffer overrun, forcing rescan");
                if !sender.notify() {
                    break;
                }
            }
            Err(e) => {
                error!("Netlink subscription failed: {}", e);
                break;
            }
        }
    }

    debug!("Netlink change subscription stopped");
}
