//! LAN discovery: finds peers on a topic over IPv6 link-local multicast.
//!
//! An announcing node multicasts its node id and TCP link port every few
//! seconds and accepts links. A looking-up node listens for those
//! announcements and dials the announcers. Sockets are created inside
//! `join`, so setup failures surface synchronously to the session.

use std::net::{Ipv6Addr, SocketAddrV6};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use helpnet_core::config::HelpnetConfig;
use helpnet_core::wire::{Announcement, HANDSHAKE_TIMEOUT_SECS, MULTICAST_ADDR};
use helpnet_core::Topic;
use helpnet_services::{Discovery, DiscoveryEvent, DiscoverySetupError, JoinOptions, PeerId};

use crate::link::{LinkContext, LinkTable};

pub mod broadcast;
pub mod listener;

/// Discovery events buffered between the network tasks and the session.
const EVENT_QUEUE: usize = 64;

/// Network settings for [`LanDiscovery`].
#[derive(Debug, Clone)]
pub struct LanSettings {
    /// Interface name, empty for the OS default.
    pub interface: String,
    pub announce_port: u16,
    pub link_port: u16,
    pub announce_interval: Duration,
    pub outbound_queue: usize,
    pub inbound_queue: usize,
}

impl LanSettings {
    pub fn from_config(config: &HelpnetConfig) -> Self {
        Self {
            interface: config.network.interface.clone(),
            announce_port: config.network.announce_port,
            link_port: config.network.link_port,
            announce_interval: Duration::from_secs(config.network.announce_interval_secs.max(1)),
            outbound_queue: config.session.outbound_queue,
            inbound_queue: config.session.inbound_queue,
        }
    }
}

/// Whether the local node should dial a remote announcer.
///
/// Only nodes that look up dial. If the remote looks up too (and can see
/// us), the lower node id dials so a pair never opens two links.
pub fn should_dial(local: u64, local_looks_up: bool, remote: u64, remote_looks_up: bool) -> bool {
    local_looks_up && local != remote && (!remote_looks_up || local < remote)
}

pub struct LanDiscovery {
    settings: LanSettings,
    node_id: u64,
    joined: bool,
    tasks: Vec<JoinHandle<()>>,
}

impl LanDiscovery {
    /// A discovery with a fresh random node id.
    pub fn new(settings: LanSettings) -> Self {
        Self::with_node_id(settings, rand::random())
    }

    pub fn with_node_id(settings: LanSettings, node_id: u64) -> Self {
        Self {
            settings,
            node_id,
            joined: false,
            tasks: Vec::new(),
        }
    }

    pub fn node_id(&self) -> PeerId {
        PeerId(self.node_id)
    }

    /// Stop announcing, listening and accepting. Open links are left to the
    /// session, which closes them on its own shutdown.
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    fn join_inner(
        &mut self,
        topic: Topic,
        options: JoinOptions,
    ) -> anyhow::Result<mpsc::Receiver<DiscoveryEvent>> {
        use anyhow::Context;

        let interface_index = broadcast::if_index(&self.settings.interface)?;
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        let link = LinkContext {
            topic,
            node_id: self.node_id,
            links: Arc::new(LinkTable::default()),
            events: events_tx,
            outbound_queue: self.settings.outbound_queue,
            inbound_queue: self.settings.inbound_queue,
            handshake_timeout: Duration::from_secs(HANDSHAKE_TIMEOUT_SECS),
        };

        if options.announce {
            let tcp = std::net::TcpListener::bind(SocketAddrV6::new(
                Ipv6Addr::UNSPECIFIED,
                self.settings.link_port,
                0,
                0,
            ))
            .context("failed to bind link listener")?;
            tcp.set_nonblocking(true).context("set_nonblocking")?;
            let link_port = tcp.local_addr().context("link listener address")?.port();
            let tcp = TcpListener::from_std(tcp).context("failed to register link listener")?;

            let socket = broadcast::make_multicast_socket(interface_index)
                .context("failed to create multicast broadcast socket")?;
            let multicast: Ipv6Addr = MULTICAST_ADDR.parse().context("multicast address")?;
            let dest = SocketAddrV6::new(multicast, self.settings.announce_port, 0, interface_index);
            let announcement = Announcement::new(&topic, self.node_id, link_port, options.discoverable);

            tracing::info!(link_port, "accepting links");
            self.tasks.push(tokio::spawn(link.clone().accept_loop(tcp)));
            self.tasks.push(tokio::spawn(broadcast::broadcast_loop(
                socket,
                announcement,
                dest,
                self.settings.announce_interval,
            )));
        }

        if options.discoverable {
            let socket = listener::make_listener_socket(interface_index, self.settings.announce_port)
                .context("failed to create multicast listener socket")?;
            let socket =
                UdpSocket::from_std(socket).context("failed to convert to tokio UdpSocket")?;
            self.tasks.push(tokio::spawn(listener::listener_loop(
                socket,
                listener::ListenerContext {
                    link,
                    announces: options.announce,
                },
            )));
        }

        Ok(events_rx)
    }
}

impl Drop for LanDiscovery {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Discovery for LanDiscovery {
    fn join(
        &mut self,
        topic: Topic,
        options: JoinOptions,
    ) -> Result<mpsc::Receiver<DiscoveryEvent>, DiscoverySetupError> {
        if !options.discoverable && !options.announce {
            return Err(DiscoverySetupError::NothingToJoin);
        }
        if self.joined {
            return Err(DiscoverySetupError::AlreadyJoined);
        }

        match self.join_inner(topic, options) {
            Ok(events) => {
                self.joined = true;
                tracing::info!(node = %self.node_id(), %topic, "LAN discovery joined");
                Ok(events)
            }
            Err(e) => {
                // half-started tasks must not outlive a failed join
                self.shutdown();
                Err(DiscoverySetupError::Network(format!("{:#}", e)))
            }
        }
    }
}
