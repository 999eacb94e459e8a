//! Events pushed from the session to the presentation layer.

use serde::{Serialize, Serializer};

use helpnet_core::MessageKind;

use crate::link::PeerId;

/// Who a displayed message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSource {
    /// The local user.
    Local,
    Peer(PeerId),
}

impl Serialize for MessageSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Local => serializer.serialize_str("self"),
            Self::Peer(id) => serializer.collect_str(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    PeerCountChanged {
        count: usize,
    },
    /// Chat or SOS, from a peer or echoed from a local send.
    MessageReceived {
        kind: MessageKind,
        text: String,
        source: MessageSource,
    },
    SafeListChanged {
        names: Vec<String>,
    },
    PeerLocationUpdated {
        peer: PeerId,
        lat: f64,
        lng: f64,
    },
    PeerLocationRemoved {
        peer: PeerId,
    },
    SessionFailed {
        reason: String,
    },
}
