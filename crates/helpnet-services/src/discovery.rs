//! Discovery seam: how the session learns about peers.
//!
//! A discovery collaborator locates nodes that joined the same topic, opens
//! raw links to them, and reports each link as a [`PeerConnection`]. It also
//! reports when a link goes away. The session never dials or accepts anything
//! itself.

use tokio::sync::mpsc;

use helpnet_core::Topic;

use crate::link::{PeerConnection, PeerId};

/// How a node takes part in a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOptions {
    /// Look up nodes announcing the topic and connect to them.
    pub discoverable: bool,
    /// Advertise this node so others connect to it.
    pub announce: bool,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            discoverable: true,
            announce: true,
        }
    }
}

#[derive(Debug)]
pub enum DiscoveryEvent {
    PeerConnected(PeerConnection),
    PeerDisconnected(PeerId),
}

/// Joining the topic failed. Fatal to the session.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DiscoverySetupError {
    #[error("join requested neither lookup nor announce")]
    NothingToJoin,
    #[error("network unavailable: {0}")]
    Network(String),
    #[error("discovery already joined a topic")]
    AlreadyJoined,
    #[error("discovery unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for DiscoverySetupError {
    fn from(e: std::io::Error) -> Self {
        Self::Network(e.to_string())
    }
}

/// A mechanism that finds peers on a topic.
pub trait Discovery {
    /// Start finding peers. Setup problems are reported synchronously;
    /// everything after that arrives on the returned channel, which closes
    /// when the collaborator stops.
    fn join(
        &mut self,
        topic: Topic,
        options: JoinOptions,
    ) -> Result<mpsc::Receiver<DiscoveryEvent>, DiscoverySetupError>;
}

// ── In-process discovery ──────────────────────────────────────────────────────

/// Discovery whose events are fed by hand through a [`DiscoveryInjector`].
///
/// Used to wire sessions together in memory and to script peer churn.
pub struct ChannelDiscovery {
    events: Option<mpsc::Receiver<DiscoveryEvent>>,
    failure: Option<DiscoverySetupError>,
    joined: Option<(Topic, JoinOptions)>,
}

/// Sending half of a [`ChannelDiscovery`].
#[derive(Clone)]
pub struct DiscoveryInjector {
    tx: mpsc::Sender<DiscoveryEvent>,
}

impl ChannelDiscovery {
    pub fn new(capacity: usize) -> (Self, DiscoveryInjector) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                events: Some(rx),
                failure: None,
                joined: None,
            },
            DiscoveryInjector { tx },
        )
    }

    /// A discovery whose `join` always fails with `error`.
    pub fn failing(error: DiscoverySetupError) -> Self {
        Self {
            events: None,
            failure: Some(error),
            joined: None,
        }
    }

    /// Topic and options of the last successful join.
    pub fn joined(&self) -> Option<(Topic, JoinOptions)> {
        self.joined
    }
}

impl Discovery for ChannelDiscovery {
    fn join(
        &mut self,
        topic: Topic,
        options: JoinOptions,
    ) -> Result<mpsc::Receiver<DiscoveryEvent>, DiscoverySetupError> {
        if let Some(e) = &self.failure {
            return Err(e.clone());
        }
        if !options.discoverable && !options.announce {
            return Err(DiscoverySetupError::NothingToJoin);
        }
        let events = self.events.take().ok_or(DiscoverySetupError::AlreadyJoined)?;
        self.joined = Some((topic, options));
        Ok(events)
    }
}

impl DiscoveryInjector {
    /// Report a new connection. Returns false if the session has stopped.
    pub async fn connect(&self, connection: PeerConnection) -> bool {
        self.tx
            .send(DiscoveryEvent::PeerConnected(connection))
            .await
            .is_ok()
    }

    /// Report a lost connection. Returns false if the session has stopped.
    pub async fn disconnect(&self, id: PeerId) -> bool {
        self.tx
            .send(DiscoveryEvent::PeerDisconnected(id))
            .await
            .is_ok()
    }
}
