//! /messages handlers: chat log and chat send.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::feed::FeedEntry;

use super::{bad_request, ApiState, SendResponse};

// ── /messages (GET) ───────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<FeedEntry>,
}

pub async fn handle_get_messages(State(state): State<ApiState>) -> Json<MessagesResponse> {
    Json(MessagesResponse {
        messages: state.feed.recent(),
    })
}

// ── /messages (POST) ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

pub async fn handle_send_message(
    State(state): State<ApiState>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendResponse>, (StatusCode, String)> {
    let report = state
        .session
        .send_chat(&req.text)
        .ok_or_else(|| bad_request("message text is empty"))?;
    Ok(Json(report.into()))
}
