//! /status handler.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::ApiState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub phase: &'static str,
    pub network: String,
    /// Hex topic, absent before the session has started.
    pub topic: Option<String>,
    pub survivors: usize,
    pub peers: Vec<String>,
    pub safe_list: Vec<String>,
    pub locations: Vec<LocationInfo>,
}

#[derive(Debug, Serialize)]
pub struct LocationInfo {
    pub peer: String,
    pub lat: f64,
    pub lng: f64,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let session = &state.session;
    let locations = session
        .peer_locations()
        .into_iter()
        .map(|(peer, loc)| LocationInfo {
            peer: peer.to_string(),
            lat: loc.lat,
            lng: loc.lng,
        })
        .collect();

    // one snapshot for both the count and the list
    let peers: Vec<String> = session.peers().iter().map(|p| p.to_string()).collect();

    Json(StatusResponse {
        phase: session.phase().as_str(),
        network: state.network.clone(),
        topic: session.topic().map(|t| t.to_hex()),
        survivors: peers.len(),
        peers,
        safe_list: session.safe_list(),
        locations,
    })
}
