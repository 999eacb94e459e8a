//! Topic derivation.
//!
//! Nodes never exchange the network name itself. Each one hashes the name
//! locally and looks for announcements carrying the same 32 bytes, so the
//! hash input is part of the protocol and must never change for a network.

use std::fmt;

/// Network name used when the config does not override it.
pub const DEFAULT_NETWORK_NAME: &str = "helpnet-p2p";

/// Opaque discovery identifier shared by every node on one network.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Topic([u8; 32]);

impl Topic {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Topic({})", &self.to_hex()[..16])
    }
}

/// Map a human-readable network name to its topic (BLAKE3 of the UTF-8 bytes).
pub fn derive_topic(network_name: &str) -> Topic {
    Topic(*blake3::hash(network_name.as_bytes()).as_bytes())
}
