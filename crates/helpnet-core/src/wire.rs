//! helpnet wire format: on-wire types for LAN discovery and peer links.
//!
//! Message payloads are defined in `protocol`. This module only covers what
//! surrounds them: the multicast announcement that advertises a node on a
//! topic, the hello exchanged when a link opens, and the frame header.
//!
//! Structs are #[repr(C, packed)] with zerocopy derives so they can be read
//! straight out of a datagram buffer without unsafe code.

use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::topic::Topic;

/// Current wire version. A receiver seeing another version drops the datagram
/// or closes the link.
pub const WIRE_VERSION: u8 = 1;

/// Link-local all-nodes multicast group used for announcements.
pub const MULTICAST_ADDR: &str = "ff02::1";

/// Largest payload accepted in one link frame.
pub const MAX_FRAME_LEN: usize = 65_535;

/// Length of the big-endian u32 that precedes every frame payload.
pub const FRAME_HEADER_LEN: usize = 4;

/// Seconds a link may take to exchange hellos before it is dropped.
pub const HANDSHAKE_TIMEOUT_SECS: u64 = 5;

/// Announcement flag: the sender looks up peers and dials them itself.
pub const FLAG_LOOKUP: u8 = 0x01;

// ── Announcement ──────────────────────────────────────────────────────────────

/// Multicast datagram advertising one node on one topic.
///
/// Wire size: 48 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct Announcement {
    /// Topic the sender has joined. Datagrams for other topics are ignored.
    pub topic: [u8; 32],

    /// Sender's random per-process node id. Becomes the PeerId on links.
    pub node_id: u64,

    /// TCP port on which the sender accepts links.
    pub link_port: u16,

    /// Wire version, currently [`WIRE_VERSION`].
    pub version: u8,

    /// Bit flags. bit 0: [`FLAG_LOOKUP`]. Others reserved, must be zero.
    pub flags: u8,

    /// Reserved, must be zero.
    pub reserved: [u8; 4],
}

assert_eq_size!(Announcement, [u8; 48]);

impl Announcement {
    pub fn new(topic: &Topic, node_id: u64, link_port: u16, looks_up: bool) -> Self {
        Self {
            topic: *topic.as_bytes(),
            node_id,
            link_port,
            version: WIRE_VERSION,
            flags: if looks_up { FLAG_LOOKUP } else { 0 },
            reserved: [0; 4],
        }
    }

    pub fn looks_up(&self) -> bool {
        self.flags & FLAG_LOOKUP != 0
    }
}

// ── Link hello ────────────────────────────────────────────────────────────────

/// First frame sent in each direction when a link opens.
///
/// Wire size: 44 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct LinkHello {
    /// Must equal the receiver's topic or the link is closed.
    pub topic: [u8; 32],

    /// Sender's node id.
    pub node_id: u64,

    /// Wire version, currently [`WIRE_VERSION`].
    pub version: u8,

    /// Reserved, must be zero.
    pub reserved: [u8; 3],
}

assert_eq_size!(LinkHello, [u8; 44]);

impl LinkHello {
    pub fn new(topic: &Topic, node_id: u64) -> Self {
        Self {
            topic: *topic.as_bytes(),
            node_id,
            version: WIRE_VERSION,
            reserved: [0; 3],
        }
    }
}

// ── Frame header ──────────────────────────────────────────────────────────────

/// Encode the length prefix for a payload. `None` if the payload is too large.
pub fn frame_header(payload_len: usize) -> Option<[u8; FRAME_HEADER_LEN]> {
    if payload_len > MAX_FRAME_LEN {
        return None;
    }
    Some((payload_len as u32).to_be_bytes())
}

/// Decode a length prefix. `None` if it announces an oversized payload.
pub fn frame_len(header: [u8; FRAME_HEADER_LEN]) -> Option<usize> {
    let len = u32::from_be_bytes(header) as usize;
    (len <= MAX_FRAME_LEN).then_some(len)
}
