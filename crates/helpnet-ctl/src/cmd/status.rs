//! Status command.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};

#[derive(Deserialize)]
struct StatusResponse {
    phase: String,
    network: String,
    topic: Option<String>,
    survivors: usize,
    peers: Vec<String>,
    safe_list: Vec<String>,
    locations: Vec<LocationInfo>,
}

#[derive(Deserialize)]
struct LocationInfo {
    peer: String,
    lat: f64,
    lng: f64,
}

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  helpnet Status");
    println!("═══════════════════════════════════════");
    println!("  Network   : {}", resp.network);
    if let Some(topic) = &resp.topic {
        println!("  Topic     : {}…", &topic[..16.min(topic.len())]);
    }
    println!("  Phase     : {}", resp.phase);
    println!("  Survivors : {}", resp.survivors);

    if !resp.peers.is_empty() {
        println!("\n  Peers:");
        for peer in &resp.peers {
            match resp.locations.iter().find(|l| &l.peer == peer) {
                Some(loc) => println!("  • {}  ({:.5}, {:.5})", peer, loc.lat, loc.lng),
                None => println!("  • {}", peer),
            }
        }
    }

    if resp.safe_list.is_empty() {
        println!("\n  Nobody has checked in safe yet.");
    } else {
        println!("\n  Safe ({}):", resp.safe_list.len());
        for name in &resp.safe_list {
            println!("  ✓ {}", name);
        }
    }

    Ok(())
}
