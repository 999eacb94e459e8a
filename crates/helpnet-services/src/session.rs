//! Session controller: ties discovery, the registry, the protocol and the
//! derived survivor state together.
//!
//! Three kinds of task touch a session:
//!   - the run loop, which applies discovery events and inbound messages,
//!   - one reader per open connection, which forwards inbound frames to the
//!     run loop over a shared channel,
//!   - callers of the command methods (`send_chat`, `check_in_safe`, ...).
//!
//! All shared state sits behind one `RwLock`. Nothing awaits while holding
//! it, and events are emitted inside the critical section that produced
//! them, so subscribers see events in mutation order.

use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use helpnet_core::config::SessionConfig;
use helpnet_core::{Location, LocationError, Message, MessageKind, Topic, SOS_TEXT};

use crate::discovery::{Discovery, DiscoveryEvent, DiscoverySetupError, JoinOptions};
use crate::event::{MessageSource, SessionEvent};
use crate::link::{PeerConnection, PeerId};
use crate::registry::PeerRegistry;
use crate::state::{PeerLocations, SafeList};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Constructed, `start` not called yet.
    Idle,
    /// Discovery joined, no peer admitted yet.
    Joining,
    /// At least one peer has been admitted. Stays active at zero peers.
    Active,
    /// Discovery setup failed. No peer is ever admitted.
    Failed,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Joining => "joining",
            Self::Active => "active",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("discovery setup failed: {0}")]
    DiscoverySetup(#[from] DiscoverySetupError),
    #[error("session already started")]
    AlreadyStarted,
}

/// Outcome of one fan-out.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: Vec<PeerId>,
    pub failed: Vec<PeerId>,
}

impl BroadcastReport {
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

struct SessionState {
    phase: SessionPhase,
    topic: Option<Topic>,
    registry: PeerRegistry,
    safe_list: SafeList,
    locations: PeerLocations,
}

struct Inner {
    state: RwLock<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    inbound_tx: mpsc::Sender<(PeerId, Bytes)>,
    inbound_rx: Mutex<Option<mpsc::Receiver<(PeerId, Bytes)>>>,
    shutdown: broadcast::Sender<()>,
    run_task: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to one peer session. Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new(&SessionConfig::default())
    }
}

impl SessionController {
    pub fn new(config: &SessionConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_queue.max(1));
        let (shutdown, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(SessionState {
                    phase: SessionPhase::Idle,
                    topic: None,
                    registry: PeerRegistry::new(),
                    safe_list: SafeList::new(),
                    locations: PeerLocations::new(),
                }),
                events,
                inbound_tx,
                inbound_rx: Mutex::new(Some(inbound_rx)),
                shutdown,
                run_task: Mutex::new(None),
            }),
        }
    }

    /// Subscribe to session events. Subscribe before `start` to see
    /// everything; a subscriber that falls `event_buffer` events behind
    /// loses the oldest ones and should re-read the accessors.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Join `topic` through `discovery` and spawn the run loop.
    ///
    /// Must be called from within a tokio runtime. On a discovery error the
    /// session moves to `Failed` and emits `SessionFailed`.
    pub fn start(
        &self,
        discovery: &mut impl Discovery,
        topic: Topic,
        options: JoinOptions,
    ) -> Result<(), SessionError> {
        let events = {
            let mut st = self.write();
            if st.phase != SessionPhase::Idle {
                return Err(SessionError::AlreadyStarted);
            }
            st.topic = Some(topic);
            match discovery.join(topic, options) {
                Ok(events) => {
                    st.phase = SessionPhase::Joining;
                    tracing::info!(
                        %topic,
                        discoverable = options.discoverable,
                        announce = options.announce,
                        "joined topic"
                    );
                    events
                }
                Err(e) => {
                    st.phase = SessionPhase::Failed;
                    tracing::error!(%topic, error = %e, "discovery setup failed");
                    self.emit(SessionEvent::SessionFailed {
                        reason: e.to_string(),
                    });
                    return Err(e.into());
                }
            }
        };

        let inbound = lock(&self.inner.inbound_rx)
            .take()
            .ok_or(SessionError::AlreadyStarted)?;
        let shutdown = self.inner.shutdown.subscribe();
        let task = tokio::spawn(self.clone().run(events, inbound, shutdown));
        *lock(&self.inner.run_task) = Some(task);
        Ok(())
    }

    /// Stop the run loop and close every connection. The registry ends empty.
    pub async fn shutdown(&self) {
        let _ = self.inner.shutdown.send(());
        let task = lock(&self.inner.run_task).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "session run loop ended abnormally");
            }
        }

        let mut st = self.write();
        st.locations.clear();
        let removed = st.registry.clear();
        if removed > 0 {
            self.emit(SessionEvent::PeerCountChanged { count: 0 });
        }
        tracing::info!(closed = removed, "session shut down");
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn phase(&self) -> SessionPhase {
        self.read().phase
    }

    pub fn topic(&self) -> Option<Topic> {
        self.read().topic
    }

    /// Number of currently connected peers.
    pub fn survivor_count(&self) -> usize {
        self.read().registry.size()
    }

    pub fn peers(&self) -> Vec<PeerId> {
        self.read().registry.snapshot()
    }

    pub fn safe_list(&self) -> Vec<String> {
        self.read().safe_list.names().to_vec()
    }

    pub fn peer_locations(&self) -> Vec<(PeerId, Location)> {
        self.read().locations.snapshot()
    }

    // ── Commands ─────────────────────────────────────────────────────────────

    /// Encode once and queue for every registered peer. A failed write is
    /// logged and reported; it never stops delivery to the others.
    pub fn broadcast(&self, message: &Message) -> BroadcastReport {
        let payload = Bytes::from(message.encode());
        let mut report = BroadcastReport::default();

        let st = self.read();
        for peer in st.registry.snapshot() {
            match st.registry.write_to(peer, payload.clone()) {
                Ok(()) => report.delivered.push(peer),
                Err(e) => {
                    tracing::warn!(%peer, error = %e, "broadcast write failed");
                    report.failed.push(peer);
                }
            }
        }
        drop(st);

        tracing::debug!(
            kind = ?message.kind(),
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "broadcast"
        );
        report
    }

    /// Send a chat line. Blank input is ignored and returns `None`.
    pub fn send_chat(&self, text: &str) -> Option<BroadcastReport> {
        let text = text.trim();
        if text.is_empty() {
            tracing::debug!("empty chat message, not sending");
            return None;
        }
        let report = self.broadcast(&Message::Chat(text.to_string()));
        self.emit(SessionEvent::MessageReceived {
            kind: MessageKind::Chat,
            text: text.to_string(),
            source: MessageSource::Local,
        });
        Some(report)
    }

    /// Broadcast an SOS and echo it locally.
    pub fn send_sos(&self) -> BroadcastReport {
        tracing::warn!("sending SOS");
        let report = self.broadcast(&Message::Sos);
        self.emit(SessionEvent::MessageReceived {
            kind: MessageKind::Sos,
            text: SOS_TEXT.to_string(),
            source: MessageSource::Local,
        });
        report
    }

    /// Report `name` safe to every peer and add it to the local safe list.
    /// Blank names are ignored and return `None`.
    pub fn check_in_safe(&self, name: &str) -> Option<BroadcastReport> {
        let name = name.trim();
        if name.is_empty() {
            tracing::debug!("empty check-in name, ignoring");
            return None;
        }
        let report = self.broadcast(&Message::SafeCheckIn(name.to_string()));
        self.record_safe(name);
        Some(report)
    }

    /// Share the local position. The local node gets no entry in the peer
    /// location set.
    pub fn report_location(&self, lat: f64, lng: f64) -> Result<BroadcastReport, LocationError> {
        let location = Location::new(lat, lng)?;
        Ok(self.broadcast(&Message::Location(location)))
    }

    // ── Run loop ─────────────────────────────────────────────────────────────

    async fn run(
        self,
        mut discovery: mpsc::Receiver<DiscoveryEvent>,
        mut inbound: mpsc::Receiver<(PeerId, Bytes)>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut discovery_open = true;
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::debug!("session run loop stopping");
                    return;
                }

                event = discovery.recv(), if discovery_open => match event {
                    Some(DiscoveryEvent::PeerConnected(connection)) => {
                        self.on_peer_connected(connection);
                    }
                    Some(DiscoveryEvent::PeerDisconnected(peer)) => {
                        self.on_peer_disconnected(peer);
                    }
                    None => {
                        tracing::warn!("discovery stopped, no new peers will be admitted");
                        discovery_open = false;
                    }
                },

                Some((peer, chunk)) = inbound.recv() => {
                    self.on_inbound(peer, &chunk);
                }
            }
        }
    }

    fn on_peer_connected(&self, mut connection: PeerConnection) {
        let peer = connection.id();
        let source = connection.take_inbound();

        let mut st = self.write();
        if let Err(e) = st.registry.admit(connection) {
            tracing::warn!(peer = %e.id, "duplicate connection ignored");
            return;
        }
        match source {
            Some(source) => {
                let reader = tokio::spawn(pump_inbound(peer, source, self.inner.inbound_tx.clone()));
                st.registry.attach_reader(peer, reader.abort_handle());
            }
            None => tracing::warn!(%peer, "connection has no inbound stream"),
        }
        st.phase = SessionPhase::Active;

        let count = st.registry.size();
        tracing::info!(%peer, count, "peer connected");
        self.emit(SessionEvent::PeerCountChanged { count });
    }

    fn on_peer_disconnected(&self, peer: PeerId) {
        let mut st = self.write();
        let removed = st.registry.remove(peer);
        if st.locations.remove(peer) {
            self.emit(SessionEvent::PeerLocationRemoved { peer });
        }
        if removed {
            let count = st.registry.size();
            tracing::info!(%peer, count, "peer disconnected");
            self.emit(SessionEvent::PeerCountChanged { count });
        } else {
            tracing::debug!(%peer, "disconnect for unknown peer ignored");
        }
    }

    fn on_inbound(&self, peer: PeerId, chunk: &[u8]) {
        match Message::decode(chunk) {
            Message::Chat(text) => {
                tracing::debug!(%peer, len = text.len(), "chat received");
                self.emit(SessionEvent::MessageReceived {
                    kind: MessageKind::Chat,
                    text,
                    source: MessageSource::Peer(peer),
                });
            }
            Message::Sos => {
                tracing::warn!(%peer, "SOS received");
                self.emit(SessionEvent::MessageReceived {
                    kind: MessageKind::Sos,
                    text: SOS_TEXT.to_string(),
                    source: MessageSource::Peer(peer),
                });
            }
            Message::SafeCheckIn(name) => {
                // stored as received; only local check-ins are trimmed
                tracing::info!(%peer, name = %name, "safe check-in received");
                self.record_safe(&name);
            }
            Message::Location(location) => {
                let mut st = self.write();
                if !st.registry.contains(peer) {
                    tracing::debug!(%peer, "location from departed peer dropped");
                    return;
                }
                st.locations.update(peer, location);
                self.emit(SessionEvent::PeerLocationUpdated {
                    peer,
                    lat: location.lat,
                    lng: location.lng,
                });
            }
        }
    }

    fn record_safe(&self, name: &str) {
        let mut st = self.write();
        if st.safe_list.insert(name) {
            self.emit(SessionEvent::SafeListChanged {
                names: st.safe_list.names().to_vec(),
            });
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine; the presentation layer may not be up yet.
        let _ = self.inner.events.send(event);
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Forward one connection's inbound frames to the run loop, in order.
async fn pump_inbound(
    peer: PeerId,
    mut source: mpsc::Receiver<Bytes>,
    sink: mpsc::Sender<(PeerId, Bytes)>,
) {
    while let Some(chunk) = source.recv().await {
        if sink.send((peer, chunk)).await.is_err() {
            break;
        }
    }
    tracing::debug!(%peer, "inbound stream ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use helpnet_core::derive_topic;
    use tokio::sync::broadcast::error::TryRecvError;

    use crate::discovery::{ChannelDiscovery, DiscoveryInjector};
    use crate::link::RemoteEnd;

    async fn next_event(rx: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for session event")
            .expect("event channel closed")
    }

    fn started() -> (
        SessionController,
        DiscoveryInjector,
        broadcast::Receiver<SessionEvent>,
    ) {
        let session = SessionController::default();
        let events = session.subscribe();
        let (mut discovery, injector) = ChannelDiscovery::new(16);
        session
            .start(&mut discovery, derive_topic("test-net"), JoinOptions::default())
            .unwrap();
        (session, injector, events)
    }

    async fn connect(
        injector: &DiscoveryInjector,
        events: &mut broadcast::Receiver<SessionEvent>,
        id: u64,
    ) -> RemoteEnd {
        let (conn, remote) = PeerConnection::pair(PeerId(id), 8);
        assert!(injector.connect(conn).await);
        assert!(matches!(
            next_event(events).await,
            SessionEvent::PeerCountChanged { .. }
        ));
        remote
    }

    #[tokio::test]
    async fn start_joins_topic() {
        let session = SessionController::default();
        assert_eq!(session.phase(), SessionPhase::Idle);

        let (mut discovery, _injector) = ChannelDiscovery::new(4);
        let topic = derive_topic("test-net");
        session
            .start(&mut discovery, topic, JoinOptions::default())
            .unwrap();

        assert_eq!(session.phase(), SessionPhase::Joining);
        assert_eq!(session.topic(), Some(topic));
        assert_eq!(discovery.joined(), Some((topic, JoinOptions::default())));
    }

    #[tokio::test]
    async fn discovery_failure_fails_the_session() {
        let session = SessionController::default();
        let mut events = session.subscribe();
        let mut discovery =
            ChannelDiscovery::failing(DiscoverySetupError::Network("no route".into()));

        let err = session
            .start(&mut discovery, derive_topic("x"), JoinOptions::default())
            .unwrap_err();
        assert!(matches!(err, SessionError::DiscoverySetup(_)));
        assert_eq!(session.phase(), SessionPhase::Failed);
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::SessionFailed {
                reason: "network unavailable: no route".into()
            }
        );
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let (session, _injector, _events) = started();
        let (mut again, _i) = ChannelDiscovery::new(4);
        assert!(matches!(
            session.start(&mut again, derive_topic("x"), JoinOptions::default()),
            Err(SessionError::AlreadyStarted)
        ));
        assert_eq!(session.phase(), SessionPhase::Joining);
    }

    #[tokio::test]
    async fn check_in_from_peer_survives_disconnect() {
        let (session, injector, mut events) = started();

        let (conn, remote) = PeerConnection::pair(PeerId(1), 8);
        injector.connect(conn).await;
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::PeerCountChanged { count: 1 }
        );
        assert_eq!(session.phase(), SessionPhase::Active);

        remote.deliver.send(Bytes::from_static(b"SAFE:Alice")).await.unwrap();
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::SafeListChanged {
                names: vec!["Alice".into()]
            }
        );

        injector.disconnect(PeerId(1)).await;
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::PeerCountChanged { count: 0 }
        );
        assert_eq!(session.safe_list(), vec!["Alice".to_string()]);
        assert_eq!(session.phase(), SessionPhase::Active);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn frames_delivered_before_disconnect_are_decoded() {
        let (session, injector, mut events) = started();

        for id in 1..=200u64 {
            let remote = connect(&injector, &mut events, id).await;
            let name = format!("survivor-{}", id);
            remote
                .deliver
                .send(Bytes::from(format!("SAFE:{}", name)))
                .await
                .unwrap();
            drop(remote);
            injector.disconnect(PeerId(id)).await;

            let mut found = false;
            for _ in 0..200 {
                if session.safe_list().contains(&name) {
                    found = true;
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            assert!(found, "check-in from peer {} was lost", id);
            while events.try_recv().is_ok() {}
        }
        assert_eq!(session.safe_list().len(), 200);
    }

    #[tokio::test]
    async fn blank_check_in_from_peer_is_stored_as_received() {
        let (session, injector, mut events) = started();
        let remote = connect(&injector, &mut events, 3).await;

        remote.deliver.send(Bytes::from_static(b"SAFE:")).await.unwrap();
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::SafeListChanged {
                names: vec![String::new()]
            }
        );
        assert_eq!(session.safe_list(), vec![String::new()]);
    }

    #[tokio::test]
    async fn broadcast_survives_one_failing_peer() {
        let (session, injector, mut events) = started();
        let mut a = connect(&injector, &mut events, 1).await;
        let b = connect(&injector, &mut events, 2).await;
        let mut c = connect(&injector, &mut events, 3).await;
        drop(b);

        let report = session.broadcast(&Message::Chat("water at the church".into()));

        assert_eq!(report.delivered, vec![PeerId(1), PeerId(3)]);
        assert_eq!(report.failed, vec![PeerId(2)]);
        assert_eq!(a.written.recv().await.unwrap(), Bytes::from_static(b"water at the church"));
        assert_eq!(c.written.recv().await.unwrap(), Bytes::from_static(b"water at the church"));
        // a failed write is not a disconnect
        assert_eq!(session.survivor_count(), 3);
    }

    #[tokio::test]
    async fn blank_check_in_is_a_no_op() {
        let (session, injector, mut events) = started();
        let mut remote = connect(&injector, &mut events, 1).await;

        assert!(session.check_in_safe("").is_none());
        assert!(session.check_in_safe("   ").is_none());

        assert!(session.safe_list().is_empty());
        assert!(remote.written.try_recv().is_err());
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn check_in_broadcasts_trimmed_name_and_updates_locally() {
        let (session, injector, mut events) = started();
        let mut remote = connect(&injector, &mut events, 1).await;

        let report = session.check_in_safe("  Bob ").unwrap();
        assert_eq!(report.delivered, vec![PeerId(1)]);
        assert_eq!(remote.written.recv().await.unwrap(), Bytes::from_static(b"SAFE:Bob"));
        assert_eq!(session.safe_list(), vec!["Bob".to_string()]);
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::SafeListChanged {
                names: vec!["Bob".into()]
            }
        );
    }

    #[tokio::test]
    async fn repeated_check_in_does_not_change_the_list() {
        let (session, injector, mut events) = started();
        let remote = connect(&injector, &mut events, 1).await;

        session.check_in_safe("Dana");
        next_event(&mut events).await;

        remote.deliver.send(Bytes::from_static(b"SAFE:Dana")).await.unwrap();
        remote.deliver.send(Bytes::from_static(b"after")).await.unwrap();
        // the duplicate produces no event, so the chat is next
        assert!(matches!(
            next_event(&mut events).await,
            SessionEvent::MessageReceived { kind: MessageKind::Chat, .. }
        ));
        assert_eq!(session.safe_list(), vec!["Dana".to_string()]);
    }

    #[tokio::test]
    async fn sos_with_no_peers_still_echoes_locally() {
        let (session, _injector, mut events) = started();

        let report = session.send_sos();
        assert_eq!(report.attempted(), 0);
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::MessageReceived {
                kind: MessageKind::Sos,
                text: "IMMEDIATE EMERGENCY !!!".into(),
                source: MessageSource::Local,
            }
        );
    }

    #[tokio::test]
    async fn sos_from_peer_is_reported_with_its_id() {
        let (_session, injector, mut events) = started();
        let remote = connect(&injector, &mut events, 7).await;

        remote.deliver.send(Bytes::from_static(b"IMMEDIATE EMERGENCY !!!")).await.unwrap();
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::MessageReceived {
                kind: MessageKind::Sos,
                text: SOS_TEXT.into(),
                source: MessageSource::Peer(PeerId(7)),
            }
        );
    }

    #[tokio::test]
    async fn chat_send_and_receive() {
        let (session, injector, mut events) = started();
        let mut remote = connect(&injector, &mut events, 4).await;

        assert!(session.send_chat("  \n ").is_none());
        let report = session.send_chat("  road blocked at bridge  ").unwrap();
        assert_eq!(report.delivered, vec![PeerId(4)]);
        assert_eq!(
            remote.written.recv().await.unwrap(),
            Bytes::from_static(b"road blocked at bridge")
        );
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::MessageReceived {
                kind: MessageKind::Chat,
                text: "road blocked at bridge".into(),
                source: MessageSource::Local,
            }
        );

        remote.deliver.send(Bytes::from_static(b"copy that")).await.unwrap();
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::MessageReceived {
                kind: MessageKind::Chat,
                text: "copy that".into(),
                source: MessageSource::Peer(PeerId(4)),
            }
        );
    }

    #[tokio::test]
    async fn peer_location_is_tracked_until_disconnect() {
        let (session, injector, mut events) = started();
        let remote = connect(&injector, &mut events, 5).await;

        remote
            .deliver
            .send(Bytes::from_static(br#"{"lat":35.68,"lng":139.69}"#))
            .await
            .unwrap();
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::PeerLocationUpdated {
                peer: PeerId(5),
                lat: 35.68,
                lng: 139.69
            }
        );
        assert_eq!(session.peer_locations().len(), 1);

        injector.disconnect(PeerId(5)).await;
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::PeerLocationRemoved { peer: PeerId(5) }
        );
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::PeerCountChanged { count: 0 }
        );
        assert!(session.peer_locations().is_empty());
    }

    #[tokio::test]
    async fn location_from_departed_peer_is_dropped() {
        let (session, _injector, _events) = started();
        session.on_inbound(PeerId(9), br#"{"lat":1.0,"lng":2.0}"#);
        assert!(session.peer_locations().is_empty());
    }

    #[tokio::test]
    async fn report_location_validates_before_sending() {
        let (session, injector, mut events) = started();
        let mut remote = connect(&injector, &mut events, 1).await;

        assert!(session.report_location(120.0, 0.0).is_err());
        assert!(remote.written.try_recv().is_err());

        let report = session.report_location(-1.5, 36.8).unwrap();
        assert_eq!(report.delivered, vec![PeerId(1)]);
        let sent = remote.written.recv().await.unwrap();
        assert_eq!(
            Message::decode(&sent),
            Message::Location(Location { lat: -1.5, lng: 36.8 })
        );
        // own position is not a peer location
        assert!(session.peer_locations().is_empty());
    }

    #[tokio::test]
    async fn duplicate_connection_is_ignored() {
        let (session, injector, mut events) = started();
        let _first = connect(&injector, &mut events, 1).await;

        let (dup, mut dup_remote) = PeerConnection::pair(PeerId(1), 8);
        injector.connect(dup).await;
        // the duplicate is dropped, which closes its outbound side
        assert!(dup_remote.written.recv().await.is_none());
        assert_eq!(session.survivor_count(), 1);
    }

    #[tokio::test]
    async fn disconnect_of_unknown_peer_is_harmless() {
        let (session, injector, mut events) = started();
        let _remote = connect(&injector, &mut events, 1).await;

        injector.disconnect(PeerId(42)).await;
        injector.disconnect(PeerId(1)).await;
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::PeerCountChanged { count: 0 }
        );
        assert_eq!(session.survivor_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_closes_every_connection() {
        let (session, injector, mut events) = started();
        let mut a = connect(&injector, &mut events, 1).await;
        let mut b = connect(&injector, &mut events, 2).await;

        session.shutdown().await;

        assert_eq!(session.survivor_count(), 0);
        assert!(session.peers().is_empty());
        assert!(a.written.recv().await.is_none());
        assert!(b.written.recv().await.is_none());
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::PeerCountChanged { count: 0 }
        );
    }
}
