use helpnet_services::SessionEvent;

use crate::*;

fn sorted(mut names: Vec<String>) -> Vec<String> {
    names.sort();
    names
}

/// Every node ends up with every check-in, whoever sent it.
#[tokio::test]
async fn test_safe_list_converges() {
    let mut nodes = mesh(3).await;
    for (node, name) in nodes.iter().zip(["Ana", "Ben", "Chidi"]) {
        node.session.check_in_safe(name).unwrap();
    }

    for node in nodes.iter_mut() {
        node.wait_for(|ev| matches!(ev, SessionEvent::SafeListChanged { names } if names.len() == 3))
            .await;
        assert_eq!(
            sorted(node.session.safe_list()),
            vec!["Ana".to_string(), "Ben".to_string(), "Chidi".to_string()]
        );
    }
}

/// The same name checked in from two nodes is listed once.
#[tokio::test]
async fn test_same_name_listed_once() {
    let mut nodes = mesh(2).await;
    nodes[0].session.check_in_safe("Grandma Rosa");
    nodes[1]
        .wait_for(|ev| matches!(ev, SessionEvent::SafeListChanged { .. }))
        .await;

    nodes[1].session.check_in_safe("Grandma Rosa");
    nodes[1].session.send_chat("marker");
    nodes[0]
        .wait_for(|ev| matches!(ev, SessionEvent::MessageReceived { .. }))
        .await;

    for node in &nodes {
        assert_eq!(node.session.safe_list(), vec!["Grandma Rosa".to_string()]);
    }
}

/// Blank check-ins never leave the node.
#[tokio::test]
async fn test_blank_check_in_sends_nothing() {
    let mut nodes = mesh(2).await;
    assert!(nodes[0].session.check_in_safe("   ").is_none());
    nodes[0].session.send_chat("after");

    // the chat is the first thing node 1 hears
    let ev = nodes[1]
        .wait_for(|ev| !matches!(ev, SessionEvent::PeerCountChanged { .. }))
        .await;
    assert!(matches!(ev, SessionEvent::MessageReceived { .. }));
    assert!(nodes[1].session.safe_list().is_empty());
}
