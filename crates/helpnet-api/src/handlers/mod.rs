//! HTTP API handlers: exposes the session as JSON.

pub mod alerts;
pub mod events;
pub mod messages;
pub mod status;

use axum::http::StatusCode;
use serde::Serialize;

use helpnet_services::{BroadcastReport, SessionController};

use crate::feed::MessageFeed;

#[derive(Clone)]
pub struct ApiState {
    pub session: SessionController,
    /// Human-readable network name the topic was derived from.
    pub network: String,
    pub feed: MessageFeed,
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Result of a command that fanned out to peers.
#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub delivered: usize,
    /// Peer ids whose write failed.
    pub failed: Vec<String>,
}

impl From<BroadcastReport> for SendResponse {
    fn from(report: BroadcastReport) -> Self {
        Self {
            delivered: report.delivered.len(),
            failed: report.failed.iter().map(|p| p.to_string()).collect(),
        }
    }
}

fn bad_request(msg: impl Into<String>) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, msg.into())
}

// Re-export handler functions for use in router setup.
pub use alerts::{handle_location, handle_safe, handle_sos};
pub use events::handle_events;
pub use messages::{handle_get_messages, handle_send_message};
pub use status::handle_status;
