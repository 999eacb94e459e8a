use std::time::Duration;

use tokio::sync::broadcast::error::TryRecvError;

use helpnet_core::{derive_topic, Message};
use helpnet_services::{
    ChannelDiscovery, DiscoverySetupError, JoinOptions, PeerConnection, PeerId, SessionController,
    SessionError, SessionEvent, SessionPhase,
};

use crate::*;

/// Check-ins outlive the peer that sent them.
#[tokio::test]
async fn test_safe_list_survives_departure() {
    let mut a = Node::start(1);
    let mut b = Node::start(2);

    link(&a, &b).await;
    a.wait_for_count(1).await;
    b.wait_for_count(1).await;

    b.session.check_in_safe("Alice");
    let ev = a
        .wait_for(|ev| matches!(ev, SessionEvent::SafeListChanged { .. }))
        .await;
    assert_eq!(
        ev,
        SessionEvent::SafeListChanged {
            names: vec!["Alice".into()]
        }
    );

    unlink(&a, &b).await;
    a.wait_for_count(0).await;
    assert_eq!(a.session.safe_list(), vec!["Alice".to_string()]);
    assert_eq!(a.session.phase(), SessionPhase::Active);
}

/// A departed peer's location is dropped with it.
#[tokio::test]
async fn test_departed_peer_location_removed() {
    let mut nodes = mesh(2).await;
    nodes[1].session.report_location(51.5, -0.12).unwrap();
    nodes[0]
        .wait_for(|ev| matches!(ev, SessionEvent::PeerLocationUpdated { .. }))
        .await;

    unlink(&nodes[0], &nodes[1]).await;
    let gone = nodes[1].id;
    let ev = nodes[0]
        .wait_for(|ev| matches!(ev, SessionEvent::PeerLocationRemoved { .. }))
        .await;
    assert_eq!(ev, SessionEvent::PeerLocationRemoved { peer: gone });
    assert!(nodes[0].session.peer_locations().is_empty());
}

/// A peer that goes away without a disconnect only fails its own writes.
#[tokio::test]
async fn test_dead_peer_does_not_block_broadcast() {
    let nodes = mesh(3).await;
    let dead = nodes[1].id;
    nodes[1].session.shutdown().await;

    // the dead node's read side is torn down asynchronously
    let mut report = nodes[0].session.broadcast(&Message::Chat("ping".into()));
    for _ in 0..100 {
        if report.failed.contains(&dead) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        report = nodes[0].session.broadcast(&Message::Chat("ping".into()));
    }

    assert_eq!(report.failed, vec![dead]);
    assert_eq!(report.delivered, vec![nodes[2].id]);
    // no disconnect was reported, so the peer is still counted
    assert_eq!(nodes[0].session.survivor_count(), 2);
}

/// Peers that reconnect are counted again.
#[tokio::test]
async fn test_reconnect_after_departure() {
    let mut a = Node::start(10);
    let mut b = Node::start(20);

    link(&a, &b).await;
    a.wait_for_count(1).await;
    unlink(&a, &b).await;
    a.wait_for_count(0).await;
    b.wait_for_count(0).await;

    link(&a, &b).await;
    a.wait_for_count(1).await;
    b.wait_for_count(1).await;

    b.session.send_chat("back online");
    a.wait_for(|ev| matches!(ev, SessionEvent::MessageReceived { .. }))
        .await;
}

/// A session whose discovery cannot join never admits anyone.
#[tokio::test]
async fn test_failed_join_is_terminal() {
    let session = SessionController::default();
    let mut events = session.subscribe();
    let mut discovery = ChannelDiscovery::failing(DiscoverySetupError::Unavailable(
        "radio off".into(),
    ));

    let err = session
        .start(&mut discovery, derive_topic(NETWORK), JoinOptions::default())
        .unwrap_err();
    assert!(matches!(err, SessionError::DiscoverySetup(_)));
    assert_eq!(session.phase(), SessionPhase::Failed);
    assert!(matches!(
        events.recv().await.unwrap(),
        SessionEvent::SessionFailed { .. }
    ));

    let (mut retry, _injector) = ChannelDiscovery::new(4);
    assert!(matches!(
        session.start(&mut retry, derive_topic(NETWORK), JoinOptions::default()),
        Err(SessionError::AlreadyStarted)
    ));
    assert_eq!(session.survivor_count(), 0);
}

/// Connects and disconnects racing from many tasks leave the count equal to
/// admitted minus removed.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_churn_keeps_count_exact() {
    let mut node = Node::start(1);
    let workers: u64 = 8;
    let per_worker: u64 = 10;

    let mut tasks = Vec::new();
    for w in 0..workers {
        let injector = node.injector.clone();
        tasks.push(tokio::spawn(async move {
            let mut remotes = Vec::new();
            for i in 0..per_worker {
                let (conn, remote) = PeerConnection::pair(PeerId(100 + w * per_worker + i), 4);
                assert!(injector.connect(conn).await);
                remotes.push(remote);
                tokio::task::yield_now().await;
            }
            // odd ids leave, twice, and an id nobody admitted is dropped too
            for i in (1..per_worker).step_by(2) {
                let id = PeerId(100 + w * per_worker + i);
                assert!(injector.disconnect(id).await);
                assert!(injector.disconnect(id).await);
                tokio::task::yield_now().await;
            }
            assert!(injector.disconnect(PeerId(10_000 + w)).await);
            remotes
        }));
    }
    let mut remotes = Vec::new();
    for task in tasks {
        remotes.extend(task.await.unwrap());
    }

    // every racing event is queued ahead of this one
    let marker = PeerId(9_999);
    let (conn, _marker_remote) = PeerConnection::pair(marker, 4);
    assert!(node.injector.connect(conn).await);
    for _ in 0..500 {
        if node.session.peers().contains(&marker) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let mut expected: Vec<PeerId> = (0..workers)
        .flat_map(|w| (0..per_worker).step_by(2).map(move |i| PeerId(100 + w * per_worker + i)))
        .collect();
    expected.push(marker);
    expected.sort_unstable();

    assert_eq!(node.session.peers(), expected);
    assert_eq!(node.session.survivor_count(), expected.len());

    let mut last_count = None;
    loop {
        match node.events.try_recv() {
            Ok(SessionEvent::PeerCountChanged { count }) => last_count = Some(count),
            Ok(_) => {}
            Err(TryRecvError::Empty) => break,
            Err(e) => panic!("event stream broke: {:?}", e),
        }
    }
    assert_eq!(last_count, Some(expected.len()));
}
