//! Peer connections: one live link to a remote node.
//!
//! A connection is a pair of bounded channels. The transport behind them
//! (a TCP task pair in the daemon, an in-memory pair in tests) pumps bytes
//! between the channels and the wire. Dropping the connection drops the
//! outbound sender, which is how the transport learns the link is closed.

use std::fmt;

use bytes::Bytes;
use serde::{Serialize, Serializer};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Session-local identifier of a remote node.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self)
    }
}

impl Serialize for PeerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Lifecycle of a connection. Only `Open` connections sit in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Open,
    Closed,
}

/// A write could not be queued for one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
    /// The transport side of the link has gone away.
    #[error("link to {0} is closed")]
    Closed(PeerId),
    /// The peer is not draining its queue.
    #[error("outbound queue to {0} is full")]
    Full(PeerId),
}

pub struct PeerConnection {
    id: PeerId,
    state: LinkState,
    outbound: mpsc::Sender<Bytes>,
    inbound: Option<mpsc::Receiver<Bytes>>,
}

impl fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerConnection")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish()
    }
}

/// The transport's view of an in-memory connection.
pub struct RemoteEnd {
    /// Frames the session wrote to the peer.
    pub written: mpsc::Receiver<Bytes>,
    /// Feed frames to the session as if the peer sent them.
    pub deliver: mpsc::Sender<Bytes>,
}

impl PeerConnection {
    /// Wrap transport channels. The connection starts in `Connecting`.
    pub fn new(
        id: PeerId,
        outbound: mpsc::Sender<Bytes>,
        inbound: mpsc::Receiver<Bytes>,
    ) -> Self {
        Self {
            id,
            state: LinkState::Connecting,
            outbound,
            inbound: Some(inbound),
        }
    }

    /// A connection whose other end is handed back to the caller.
    pub fn pair(id: PeerId, capacity: usize) -> (Self, RemoteEnd) {
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let (in_tx, in_rx) = mpsc::channel(capacity);
        (
            Self::new(id, out_tx, in_rx),
            RemoteEnd {
                written: out_rx,
                deliver: in_tx,
            },
        )
    }

    /// Two connections wired back to back: `a` is node A's link to node B
    /// (so it carries B's id) and `b` is B's link to A.
    pub fn linked(a_id: PeerId, b_id: PeerId, capacity: usize) -> (Self, Self) {
        let (a_to_b_tx, a_to_b_rx) = mpsc::channel(capacity);
        let (b_to_a_tx, b_to_a_rx) = mpsc::channel(capacity);
        (
            Self::new(b_id, a_to_b_tx, b_to_a_rx),
            Self::new(a_id, b_to_a_tx, a_to_b_rx),
        )
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: LinkState) {
        self.state = state;
    }

    /// Queue one frame for the peer without waiting.
    pub fn write_bytes(&self, chunk: Bytes) -> Result<(), WriteError> {
        if self.state == LinkState::Closed {
            return Err(WriteError::Closed(self.id));
        }
        self.outbound.try_send(chunk).map_err(|e| match e {
            TrySendError::Full(_) => WriteError::Full(self.id),
            TrySendError::Closed(_) => WriteError::Closed(self.id),
        })
    }

    /// Take the inbound frame stream. It ends when the transport closes.
    /// Returns `None` once taken.
    pub fn take_inbound(&mut self) -> Option<mpsc::Receiver<Bytes>> {
        self.inbound.take()
    }
}
