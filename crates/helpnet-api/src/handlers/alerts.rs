//! /sos, /safe and /location handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use super::{bad_request, ApiState, SendResponse};

pub async fn handle_sos(State(state): State<ApiState>) -> Json<SendResponse> {
    Json(state.session.send_sos().into())
}

#[derive(Deserialize)]
pub struct SafeRequest {
    pub name: String,
}

pub async fn handle_safe(
    State(state): State<ApiState>,
    Json(req): Json<SafeRequest>,
) -> Result<Json<SendResponse>, (StatusCode, String)> {
    let report = state
        .session
        .check_in_safe(&req.name)
        .ok_or_else(|| bad_request("name is empty"))?;
    Ok(Json(report.into()))
}

#[derive(Deserialize)]
pub struct LocationRequest {
    pub lat: f64,
    pub lng: f64,
}

pub async fn handle_location(
    State(state): State<ApiState>,
    Json(req): Json<LocationRequest>,
) -> Result<Json<SendResponse>, (StatusCode, String)> {
    let report = state
        .session
        .report_location(req.lat, req.lng)
        .map_err(|e| bad_request(e.to_string()))?;
    Ok(Json(report.into()))
}
