//! Peer registry: the connections that are currently open.
//!
//! Membership is the survivor count. The registry does no locking of its own;
//! it lives inside the session's state lock, so every mutation here is already
//! serialized with the safe list and location updates.

use std::collections::HashMap;

use bytes::Bytes;
use tokio::task::AbortHandle;

use crate::link::{LinkState, PeerConnection, PeerId, WriteError};

/// A connection was offered under an id that is already registered.
#[derive(Debug, thiserror::Error)]
#[error("peer {id} is already connected")]
pub struct DuplicateConnectionError {
    pub id: PeerId,
    /// The rejected connection, returned so the caller decides how to drop it.
    pub connection: PeerConnection,
}

struct Member {
    connection: PeerConnection,
    reader: Option<AbortHandle>,
}

#[derive(Default)]
pub struct PeerRegistry {
    members: HashMap<PeerId, Member>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and mark it open.
    pub fn admit(&mut self, mut connection: PeerConnection) -> Result<PeerId, DuplicateConnectionError> {
        let id = connection.id();
        if self.members.contains_key(&id) {
            return Err(DuplicateConnectionError { id, connection });
        }
        connection.set_state(LinkState::Open);
        self.members.insert(
            id,
            Member {
                connection,
                reader: None,
            },
        );
        Ok(id)
    }

    /// Attach the read task of a member so `clear` can cancel it.
    /// Returns false if the peer is not registered.
    pub fn attach_reader(&mut self, id: PeerId, reader: AbortHandle) -> bool {
        match self.members.get_mut(&id) {
            Some(member) => {
                member.reader = Some(reader);
                true
            }
            None => false,
        }
    }

    /// Close and forget a peer. Removing an absent id is a no-op.
    /// Returns true if a member was removed.
    ///
    /// The reader is not cancelled: frames the transport delivered before
    /// the disconnect are still forwarded, and the reader ends with its
    /// stream.
    pub fn remove(&mut self, id: PeerId) -> bool {
        match self.members.remove(&id) {
            Some(mut member) => {
                member.reader = None;
                close(member);
                true
            }
            None => false,
        }
    }

    /// Close every member and cancel its reader. Returns how many were
    /// removed.
    pub fn clear(&mut self) -> usize {
        let count = self.members.len();
        for (_, member) in self.members.drain() {
            close(member);
        }
        count
    }

    /// Current members, sorted by id.
    pub fn snapshot(&self) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self.members.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.members.contains_key(&id)
    }

    /// Write one frame to a single member.
    pub fn write_to(&self, id: PeerId, chunk: Bytes) -> Result<(), WriteError> {
        match self.members.get(&id) {
            Some(member) => member.connection.write_bytes(chunk),
            None => Err(WriteError::Closed(id)),
        }
    }
}

fn close(mut member: Member) {
    if let Some(reader) = member.reader.take() {
        reader.abort();
    }
    member.connection.set_state(LinkState::Closed);
}
