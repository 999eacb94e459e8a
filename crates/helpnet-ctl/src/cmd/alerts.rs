//! SOS, safe check-in and location commands.

use anyhow::Result;
use serde_json::json;

use super::SendResponse;
use super::http::{base_url, post_json, post_json_body};

pub async fn cmd_sos(port: u16) -> Result<()> {
    let resp: SendResponse = post_json(&format!("{}/sos", base_url(port))).await?;
    resp.print("SOS");
    Ok(())
}

pub async fn cmd_safe(port: u16, name: &str) -> Result<()> {
    let resp: SendResponse =
        post_json_body(&format!("{}/safe", base_url(port)), &json!({ "name": name })).await?;
    resp.print("Safe check-in");
    Ok(())
}

pub async fn cmd_location(port: u16, lat: f64, lng: f64) -> Result<()> {
    let resp: SendResponse = post_json_body(
        &format!("{}/location", base_url(port)),
        &json!({ "lat": lat, "lng": lng }),
    )
    .await?;
    resp.print("Location");
    Ok(())
}
