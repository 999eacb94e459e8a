//! Derived survivor state: who checked in safe, and where peers last were.

use std::collections::{HashMap, HashSet};

use helpnet_core::Location;

use crate::link::PeerId;

/// Names of people reported safe, in first-seen order.
///
/// Grows for the lifetime of the session. A name already present is not
/// added again, so two people sharing a name appear once.
#[derive(Debug, Default, Clone)]
pub struct SafeList {
    names: Vec<String>,
    seen: HashSet<String>,
}

impl SafeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the list changed.
    pub fn insert(&mut self, name: &str) -> bool {
        if self.seen.contains(name) {
            return false;
        }
        self.seen.insert(name.to_string());
        self.names.push(name.to_string());
        true
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Last reported location per connected peer.
#[derive(Debug, Default, Clone)]
pub struct PeerLocations {
    by_peer: HashMap<PeerId, Location>,
}

impl PeerLocations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, peer: PeerId, location: Location) {
        self.by_peer.insert(peer, location);
    }

    /// Returns true if the peer had a location.
    pub fn remove(&mut self, peer: PeerId) -> bool {
        self.by_peer.remove(&peer).is_some()
    }

    pub fn get(&self, peer: PeerId) -> Option<Location> {
        self.by_peer.get(&peer).copied()
    }

    /// All entries, sorted by peer id.
    pub fn snapshot(&self) -> Vec<(PeerId, Location)> {
        let mut entries: Vec<_> = self.by_peer.iter().map(|(p, l)| (*p, *l)).collect();
        entries.sort_unstable_by_key(|(p, _)| *p);
        entries
    }

    pub fn clear(&mut self) {
        self.by_peer.clear();
    }

    pub fn len(&self) -> usize {
        self.by_peer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_peer.is_empty()
    }
}
