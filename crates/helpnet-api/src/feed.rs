//! In-memory chat/SOS log for clients that poll instead of streaming.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use helpnet_core::MessageKind;
use helpnet_services::{MessageSource, SessionEvent};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedEntry {
    /// Increases by one per recorded message, across evictions.
    pub seq: u64,
    /// Milliseconds since the Unix epoch, local clock.
    pub timestamp: u64,
    pub kind: MessageKind,
    pub text: String,
    pub source: MessageSource,
}

struct FeedInner {
    entries: VecDeque<FeedEntry>,
    capacity: usize,
    next_seq: u64,
}

/// Bounded ring of the most recent messages. Oldest entries are evicted.
#[derive(Clone)]
pub struct MessageFeed {
    inner: Arc<Mutex<FeedInner>>,
}

impl MessageFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FeedInner {
                entries: VecDeque::with_capacity(capacity.min(1024)),
                capacity,
                next_seq: 0,
            })),
        }
    }

    /// Record a `MessageReceived` event. Other events are ignored.
    /// Returns true if something was recorded.
    pub fn record(&self, event: &SessionEvent) -> bool {
        let SessionEvent::MessageReceived { kind, text, source } = event else {
            return false;
        };
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.capacity == 0 {
            return false;
        }
        if inner.entries.len() == inner.capacity {
            inner.entries.pop_front();
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.push_back(FeedEntry {
            seq,
            timestamp: now_millis(),
            kind: *kind,
            text: text.clone(),
            source: *source,
        });
        true
    }

    /// Oldest first.
    pub fn recent(&self) -> Vec<FeedEntry> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record every message from `events` until the session goes away.
    pub fn spawn_recorder(&self, mut events: broadcast::Receiver<SessionEvent>) -> JoinHandle<()> {
        let feed = self.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        feed.record(&event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "message feed fell behind, events lost");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
