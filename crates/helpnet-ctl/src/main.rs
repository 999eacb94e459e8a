//! helpnet-ctl: command-line interface for the helpnet daemon.

use anyhow::{Context, Result};

mod cmd;

const DEFAULT_PORT: u16 = 9001;

fn print_usage() {
    println!("Usage: helpnet-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  status                 Show phase, survivors, peers and the safe list");
    println!("  messages               Show recent chat and SOS messages");
    println!("  send <text...>         Send a chat message to every peer");
    println!("  sos                    Broadcast an emergency alert");
    println!("  safe <name...>         Report a person safe");
    println!("  location <lat> <lng>   Share a position with every peer");
    println!();
    println!("Options:");
    println!("  --port <port>   API port (default: {})", DEFAULT_PORT);
}

fn parse_coord(value: &str, name: &str) -> Result<f64> {
    value
        .parse()
        .with_context(|| format!("{} must be a number, got '{}'", name, value))
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --port option
    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | [] => cmd::status::cmd_status(port).await,
        ["messages"] => cmd::messages::cmd_messages(port).await,
        ["send", text @ ..] if !text.is_empty() => {
            cmd::messages::cmd_send(port, &text.join(" ")).await
        }
        ["sos"] => cmd::alerts::cmd_sos(port).await,
        ["safe", name @ ..] if !name.is_empty() => {
            cmd::alerts::cmd_safe(port, &name.join(" ")).await
        }
        ["location", lat, lng] => {
            let lat = parse_coord(lat, "latitude")?;
            let lng = parse_coord(lng, "longitude")?;
            cmd::alerts::cmd_location(port, lat, lng).await
        }
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
