//! Topic announcement broadcast.
//!
//! Periodically sends an Announcement datagram to the link-local multicast
//! address ff02::1 so nearby nodes on the same topic can dial us.

use std::net::SocketAddrV6;
use std::time::Duration;

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::time;
use zerocopy::AsBytes;

use helpnet_core::wire::Announcement;
use helpnet_services::PeerId;

/// Send `announcement` to `dest` every `interval`.
///
/// Runs forever. Cancel by aborting the task.
pub async fn broadcast_loop(
    socket: Socket,
    announcement: Announcement,
    dest: SocketAddrV6,
    interval: Duration,
) {
    let mut ticker = time::interval(interval);
    let node_id = announcement.node_id;

    tracing::info!(
        node = %PeerId(node_id),
        dest = %dest,
        interval_secs = interval.as_secs(),
        "announcement broadcast starting"
    );

    loop {
        ticker.tick().await;
        match socket.send_to(announcement.as_bytes(), &dest.into()) {
            Ok(n) => tracing::trace!(bytes = n, "announcement sent"),
            Err(e) => tracing::warn!(error = %e, "announcement send failed"),
        }
    }
}

/// Create a UDP socket suitable for sending IPv6 multicast.
pub fn make_multicast_socket(interface_index: u32) -> Result<Socket> {
    let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP)).context("socket()")?;

    socket.set_reuse_address(true).context("SO_REUSEADDR")?;
    socket
        .set_multicast_if_v6(interface_index)
        .context("IPV6_MULTICAST_IF")?;
    // TTL 1, link-local only
    socket
        .set_multicast_hops_v6(1)
        .context("IPV6_MULTICAST_HOPS")?;
    // Other processes on this host may be on the same topic.
    socket
        .set_multicast_loop_v6(true)
        .context("IPV6_MULTICAST_LOOP")?;

    Ok(socket)
}

/// Get the OS interface index for a named network interface.
/// An empty name means "let the OS choose" and yields 0.
pub fn if_index(name: &str) -> Result<u32> {
    if name.is_empty() {
        return Ok(0);
    }
    let name_cstr = std::ffi::CString::new(name).context("interface name contains null byte")?;
    let index = unsafe { libc::if_nametoindex(name_cstr.as_ptr()) };
    if index == 0 {
        anyhow::bail!("interface '{}' not found", name);
    }
    Ok(index)
}
