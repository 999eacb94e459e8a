//! CLI command modules.

pub mod alerts;
pub mod http;
pub mod messages;
pub mod status;

use serde::Deserialize;

/// Reply to any command that fans out to peers.
#[derive(Deserialize)]
pub struct SendResponse {
    pub delivered: usize,
    pub failed: Vec<String>,
}

impl SendResponse {
    pub fn print(&self, what: &str) {
        println!("{} sent to {} peer(s).", what, self.delivered);
        for peer in &self.failed {
            println!("  ✗ could not reach {}", peer);
        }
    }
}
