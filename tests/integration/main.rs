//! helpnet integration test harness.
//!
//! Tests in this crate run several sessions in one process. Sessions are
//! wired to each other with in-memory links and learn about peers through
//! `ChannelDiscovery`, so every scenario is deterministic and needs no
//! network access.
//!
//!   cargo test --test integration

use std::time::Duration;

use tokio::sync::broadcast;

use helpnet_core::derive_topic;
use helpnet_services::{
    ChannelDiscovery, DiscoveryInjector, JoinOptions, PeerConnection, PeerId, SessionController,
    SessionEvent,
};

mod churn;
mod messaging;
mod survivors;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const NETWORK: &str = "helpnet-it";
pub const LINK_QUEUE: usize = 32;

/// One running session plus the handles a test needs to drive it.
pub struct Node {
    pub id: PeerId,
    pub session: SessionController,
    pub injector: DiscoveryInjector,
    pub events: broadcast::Receiver<SessionEvent>,
}

impl Node {
    pub fn start(id: u64) -> Self {
        let session = SessionController::default();
        let events = session.subscribe();
        let (mut discovery, injector) = ChannelDiscovery::new(LINK_QUEUE);
        session
            .start(&mut discovery, derive_topic(NETWORK), JoinOptions::default())
            .expect("in-memory discovery always joins");
        Self {
            id: PeerId(id),
            session,
            injector,
            events,
        }
    }

    /// Wait for the first event matching `pred`, skipping the rest.
    pub async fn wait_for(&mut self, pred: impl Fn(&SessionEvent) -> bool) -> SessionEvent {
        let deadline = Duration::from_secs(5);
        tokio::time::timeout(deadline, async {
            loop {
                match self.events.recv().await {
                    Ok(ev) if pred(&ev) => return ev,
                    Ok(_) => continue,
                    Err(e) => panic!("event stream broke on {}: {:?}", self.id, e),
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("node {} timed out waiting for event", self.id))
    }

    pub async fn wait_for_count(&mut self, count: usize) {
        self.wait_for(|ev| matches!(ev, SessionEvent::PeerCountChanged { count: c } if *c == count))
            .await;
    }
}

/// Link two nodes with an in-memory connection in each direction's registry.
pub async fn link(a: &Node, b: &Node) {
    let (at_a, at_b) = PeerConnection::linked(a.id, b.id, LINK_QUEUE);
    assert!(a.injector.connect(at_a).await);
    assert!(b.injector.connect(at_b).await);
}

/// Tell both ends that their link went away.
pub async fn unlink(a: &Node, b: &Node) {
    a.injector.disconnect(b.id).await;
    b.injector.disconnect(a.id).await;
}

/// `n` nodes, every pair linked, every node settled at `n - 1` peers.
pub async fn mesh(n: u64) -> Vec<Node> {
    let mut nodes: Vec<Node> = (1..=n).map(Node::start).collect();
    for i in 0..nodes.len() {
        for j in (i + 1)..nodes.len() {
            link(&nodes[i], &nodes[j]).await;
        }
    }
    let expected = nodes.len() - 1;
    for node in nodes.iter_mut() {
        node.wait_for_count(expected).await;
    }
    nodes
}

// ── Harness tests ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_mesh_settles() {
    let nodes = mesh(4).await;
    for node in &nodes {
        assert_eq!(node.session.survivor_count(), 3);
        assert!(!node.session.peers().contains(&node.id));
    }
}
