use helpnet_core::{MessageKind, SOS_TEXT};
use helpnet_services::{MessageSource, SessionEvent};

use crate::*;

/// A chat line sent by one node arrives at every other node, attributed to it.
#[tokio::test]
async fn test_chat_reaches_every_peer() {
    let mut nodes = mesh(3).await;
    let sender = nodes[0].id;

    let report = nodes[0].session.send_chat("  bridge on 5th street is down ").unwrap();
    assert_eq!(report.delivered.len(), 2);
    assert!(report.failed.is_empty());

    for node in nodes.iter_mut().skip(1) {
        let ev = node
            .wait_for(|ev| matches!(ev, SessionEvent::MessageReceived { .. }))
            .await;
        assert_eq!(
            ev,
            SessionEvent::MessageReceived {
                kind: MessageKind::Chat,
                text: "bridge on 5th street is down".into(),
                source: MessageSource::Peer(sender),
            }
        );
    }
}

/// SOS is echoed to the sender and raised on every peer.
#[tokio::test]
async fn test_sos_raised_everywhere() {
    let mut nodes = mesh(3).await;
    let sender = nodes[1].id;
    nodes[1].session.send_sos();

    for node in nodes.iter_mut() {
        let expected_source = if node.id == sender {
            MessageSource::Local
        } else {
            MessageSource::Peer(sender)
        };
        let ev = node
            .wait_for(|ev| matches!(ev, SessionEvent::MessageReceived { kind: MessageKind::Sos, .. }))
            .await;
        assert_eq!(
            ev,
            SessionEvent::MessageReceived {
                kind: MessageKind::Sos,
                text: SOS_TEXT.into(),
                source: expected_source,
            }
        );
    }
}

/// Text that only looks like a protocol message is delivered as chat.
#[tokio::test]
async fn test_near_miss_text_stays_chat() {
    let mut nodes = mesh(2).await;
    nodes[0].session.send_chat("IMMEDIATE EMERGENCY !!! at the dam");

    let ev = nodes[1]
        .wait_for(|ev| matches!(ev, SessionEvent::MessageReceived { .. }))
        .await;
    assert!(matches!(
        ev,
        SessionEvent::MessageReceived { kind: MessageKind::Chat, ref text, .. }
            if text == "IMMEDIATE EMERGENCY !!! at the dam"
    ));
}

/// A reported position shows up on peers but never on the reporter.
#[tokio::test]
async fn test_location_shared_with_peers() {
    let mut nodes = mesh(3).await;
    let reporter = nodes[2].id;
    nodes[2].session.report_location(-33.45, -70.66).unwrap();

    for node in nodes.iter_mut().take(2) {
        let ev = node
            .wait_for(|ev| matches!(ev, SessionEvent::PeerLocationUpdated { .. }))
            .await;
        assert_eq!(
            ev,
            SessionEvent::PeerLocationUpdated {
                peer: reporter,
                lat: -33.45,
                lng: -70.66,
            }
        );
        assert_eq!(node.session.peer_locations().len(), 1);
    }
    assert!(nodes[2].session.peer_locations().is_empty());
}
