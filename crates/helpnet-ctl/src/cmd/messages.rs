//! Messaging commands.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::SendResponse;
use super::http::{base_url, get_json, post_json_body};

#[derive(Deserialize)]
struct MessagesResponse {
    messages: Vec<MessageJson>,
}

#[derive(Deserialize)]
struct MessageJson {
    timestamp: u64,
    kind: String,
    text: String,
    source: String,
}

#[derive(Serialize)]
struct SendMessageRequest {
    text: String,
}

pub async fn cmd_messages(port: u16) -> Result<()> {
    let resp: MessagesResponse = get_json(&format!("{}/messages", base_url(port))).await?;

    if resp.messages.is_empty() {
        println!("No messages yet.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Messages ({})", resp.messages.len());
    println!("═══════════════════════════════════════");

    for m in &resp.messages {
        let from = if m.source == "self" { "you" } else { m.source.as_str() };
        let marker = if m.kind == "sos" { "🚨 " } else { "" };
        println!("  [{}] {}{}: {}", m.timestamp / 1000, marker, from, m.text);
    }

    Ok(())
}

pub async fn cmd_send(port: u16, text: &str) -> Result<()> {
    let req = SendMessageRequest {
        text: text.to_string(),
    };
    let resp: SendResponse =
        post_json_body(&format!("{}/messages", base_url(port)), &req).await?;
    resp.print("Message");
    Ok(())
}
