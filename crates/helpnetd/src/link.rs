//! TCP peer links.
//!
//! A link opens with a [`LinkHello`] in each direction, then carries
//! length-prefixed frames. Each accepted link becomes a [`PeerConnection`]
//! backed by two tasks: a writer draining the outbound queue onto the socket
//! and a reader feeding frames to the session. When the reader stops, the
//! node id is released and `PeerDisconnected` is reported.

use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use zerocopy::{AsBytes, FromBytes};

use helpnet_core::wire::{frame_header, frame_len, LinkHello, FRAME_HEADER_LEN, WIRE_VERSION};
use helpnet_core::Topic;
use helpnet_services::{DiscoveryEvent, PeerConnection, PeerId};

const HELLO_LEN: usize = std::mem::size_of::<LinkHello>();

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("i/o during handshake: {0}")]
    Io(#[from] io::Error),
    #[error("peer is on another topic")]
    TopicMismatch,
    #[error("unsupported wire version {0}")]
    Version(u8),
    #[error("connected to ourselves")]
    SelfConnect,
    #[error("no hello within {0:?}")]
    Timeout(Duration),
}

// ── Frame codec ───────────────────────────────────────────────────────────────

/// Write one frame. Payloads over the frame limit are rejected.
pub async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, payload: &[u8]) -> io::Result<()> {
    let header = frame_header(payload.len()).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame of {} bytes exceeds limit", payload.len()),
        )
    })?;
    w.write_all(&header).await?;
    w.write_all(payload).await?;
    w.flush().await
}

/// Read one frame. `Ok(None)` on a clean end of stream between frames.
pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> io::Result<Option<Bytes>> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    match r.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = frame_len(header)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "oversized frame"))?;
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload).await?;
    Ok(Some(Bytes::from(payload)))
}

// ── Handshake ─────────────────────────────────────────────────────────────────

/// Exchange hellos. Returns the remote node id. A peer that has not sent
/// its hello within `limit` fails the handshake.
pub async fn handshake<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    topic: &Topic,
    local_id: u64,
    limit: Duration,
) -> Result<u64, HandshakeError> {
    timeout(limit, exchange_hellos(stream, topic, local_id))
        .await
        .map_err(|_| HandshakeError::Timeout(limit))?
}

async fn exchange_hellos<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    topic: &Topic,
    local_id: u64,
) -> Result<u64, HandshakeError> {
    stream
        .write_all(LinkHello::new(topic, local_id).as_bytes())
        .await?;
    stream.flush().await?;

    let mut buf = [0u8; HELLO_LEN];
    stream.read_exact(&mut buf).await?;
    let hello = LinkHello::read_from(&buf[..]).ok_or_else(|| {
        HandshakeError::Io(io::Error::new(io::ErrorKind::InvalidData, "malformed hello"))
    })?;

    if hello.version != WIRE_VERSION {
        return Err(HandshakeError::Version(hello.version));
    }
    if hello.topic != *topic.as_bytes() {
        return Err(HandshakeError::TopicMismatch);
    }
    let remote_id = hello.node_id;
    if remote_id == local_id {
        return Err(HandshakeError::SelfConnect);
    }
    Ok(remote_id)
}

// ── Link table ────────────────────────────────────────────────────────────────

/// Node ids with a link open or being dialled. One link per remote node.
#[derive(Default)]
pub struct LinkTable {
    ids: Mutex<HashSet<u64>>,
}

impl LinkTable {
    /// Returns false if `id` already has a link.
    pub fn claim(&self, id: u64) -> bool {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner).insert(id)
    }

    pub fn release(&self, id: u64) {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner).remove(&id);
    }

    pub fn contains(&self, id: u64) -> bool {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner).contains(&id)
    }
}

// ── Link context ──────────────────────────────────────────────────────────────

/// Everything needed to open links for one joined topic.
#[derive(Clone)]
pub struct LinkContext {
    pub topic: Topic,
    pub node_id: u64,
    pub links: Arc<LinkTable>,
    pub events: mpsc::Sender<DiscoveryEvent>,
    pub outbound_queue: usize,
    pub inbound_queue: usize,
    pub handshake_timeout: Duration,
}

impl LinkContext {
    /// Dial an announcer. `expected` is the id it announced; the id in its
    /// hello must match. The caller must already hold the claim on it.
    pub async fn dial(self, addr: SocketAddr, expected: u64) {
        let result: Result<TcpStream, HandshakeError> = async {
            let mut stream = TcpStream::connect(addr).await?;
            let remote =
                handshake(&mut stream, &self.topic, self.node_id, self.handshake_timeout).await?;
            if remote != expected {
                return Err(HandshakeError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "hello id differs from announcement",
                )));
            }
            Ok(stream)
        }
        .await;

        match result {
            Ok(stream) => {
                tracing::debug!(peer = %PeerId(expected), %addr, "dialled peer");
                self.open(stream, expected).await;
            }
            Err(e) => {
                tracing::debug!(peer = %PeerId(expected), %addr, error = %e, "dial failed");
                self.links.release(expected);
            }
        }
    }

    /// Accept inbound links. Runs until the task is aborted.
    pub async fn accept_loop(self, listener: TcpListener) {
        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            };
            tokio::spawn(self.clone().accept(stream, addr));
        }
    }

    async fn accept(self, mut stream: TcpStream, addr: SocketAddr) {
        let remote = match handshake(&mut stream, &self.topic, self.node_id, self.handshake_timeout)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                tracing::debug!(%addr, error = %e, "inbound handshake rejected");
                return;
            }
        };
        if !self.links.claim(remote) {
            tracing::debug!(peer = %PeerId(remote), %addr, "already linked, closing");
            return;
        }
        tracing::debug!(peer = %PeerId(remote), %addr, "accepted peer");
        self.open(stream, remote).await;
    }

    /// Start the pump tasks and report the connection.
    async fn open(self, stream: TcpStream, remote: u64) {
        let peer = PeerId(remote);
        let (mut read_half, mut write_half) = stream.into_split();
        let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(self.outbound_queue.max(1));
        let (in_tx, in_rx) = mpsc::channel::<Bytes>(self.inbound_queue.max(1));

        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = write_frame(&mut write_half, &frame).await {
                    tracing::debug!(%peer, error = %e, "link write failed");
                    if e.kind() != io::ErrorKind::InvalidInput {
                        break;
                    }
                }
            }
            let _ = write_half.shutdown().await;
        });

        // Report before the reader starts so a disconnect can never overtake
        // the connect on the event channel.
        let connection = PeerConnection::new(peer, out_tx, in_rx);
        if self.events.send(DiscoveryEvent::PeerConnected(connection)).await.is_err() {
            tracing::debug!(%peer, "session gone, dropping link");
            self.links.release(remote);
            return;
        }

        let links = self.links;
        let events = self.events;
        tokio::spawn(async move {
            loop {
                match read_frame(&mut read_half).await {
                    Ok(Some(frame)) => {
                        if in_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::debug!(%peer, error = %e, "link read failed");
                        break;
                    }
                }
            }
            // release only after the disconnect is queued, so a redial
            // cannot report a connect while this link is still registered
            let _ = events.send(DiscoveryEvent::PeerDisconnected(peer)).await;
            links.release(remote);
        });
    }
}
