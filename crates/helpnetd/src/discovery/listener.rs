//! Topic announcement listener.
//!
//! Joins the ff02::1 multicast group and listens for Announcement datagrams.
//! Announcers on our topic that we are responsible for dialling get a dial
//! task; everything else is dropped.

use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use zerocopy::FromBytes;

use helpnet_core::wire::{Announcement, MULTICAST_ADDR, WIRE_VERSION};
use helpnet_services::PeerId;

use super::should_dial;
use crate::link::LinkContext;

/// What the listener needs to know about the local node.
pub struct ListenerContext {
    pub link: LinkContext,
    /// Whether we announce. A looking-up remote only dials us if we do.
    pub announces: bool,
}

/// Listen for announcements and dial announcers. Runs forever; cancel by
/// aborting the task.
pub async fn listener_loop(socket: UdpSocket, ctx: ListenerContext) {
    let mut buf = vec![0u8; 1024];
    let topic = *ctx.link.topic.as_bytes();

    tracing::info!(
        addr = ?socket.local_addr().ok(),
        "announcement listener starting"
    );

    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "recv_from failed");
                continue;
            }
        };

        let from = match from {
            SocketAddr::V6(v6) => v6,
            SocketAddr::V4(_) => {
                tracing::warn!("received IPv4 datagram on IPv6 socket, ignoring");
                continue;
            }
        };

        let Some(announcement) = Announcement::read_from_prefix(&buf[..len]) else {
            tracing::trace!(len, "failed to parse announcement");
            continue;
        };

        if announcement.topic != topic || announcement.version != WIRE_VERSION {
            continue;
        }
        // copy out of the packed struct
        let remote = announcement.node_id;
        let link_port = announcement.link_port;
        if remote == ctx.link.node_id {
            tracing::trace!("ignoring own announcement");
            continue;
        }
        let remote_dials_us = announcement.looks_up() && ctx.announces;
        if !should_dial(ctx.link.node_id, true, remote, remote_dials_us) {
            continue;
        }
        if !ctx.link.links.claim(remote) {
            continue;
        }

        let addr = SocketAddrV6::new(*from.ip(), link_port, 0, from.scope_id());
        tracing::debug!(peer = %PeerId(remote), %addr, "announcer discovered, dialling");
        tokio::spawn(ctx.link.clone().dial(addr.into(), remote));
    }
}

/// Create a UDP socket joined to the ff02::1 multicast group.
pub fn make_listener_socket(interface_index: u32, port: u16) -> Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP)).context("socket()")?;

    socket.set_reuse_address(true).context("SO_REUSEADDR")?;
    socket.set_only_v6(true).context("IPV6_V6ONLY")?;
    socket.set_nonblocking(true).context("set_nonblocking")?;

    let bind_addr = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, port, 0, 0);
    socket.bind(&bind_addr.into()).context("bind()")?;

    let multicast: Ipv6Addr = MULTICAST_ADDR.parse().context("multicast address")?;
    socket
        .join_multicast_v6(&multicast, interface_index)
        .context("IPV6_JOIN_GROUP")?;

    Ok(socket.into())
}
