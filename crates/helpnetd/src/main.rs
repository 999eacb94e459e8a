//! helpnetd: helpnet peer-to-peer emergency messaging daemon.

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;

use helpnet_core::config::HelpnetConfig;
use helpnet_core::{derive_topic, MessageKind};
use helpnet_services::{JoinOptions, SessionController, SessionEvent};

mod discovery;
mod link;

use discovery::{LanDiscovery, LanSettings};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    match HelpnetConfig::write_default_if_missing() {
        Ok(path) => tracing::debug!(path = %path.display(), "config file"),
        Err(e) => tracing::warn!(error = %e, "failed to write default config"),
    }
    let config = HelpnetConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        HelpnetConfig::default()
    });

    let topic = derive_topic(&config.network.name);
    tracing::info!(network = %config.network.name, %topic, "helpnetd starting");

    let session = SessionController::new(&config.session);
    let feed = helpnet_api::MessageFeed::new(config.api.message_history);
    let _recorder = feed.spawn_recorder(session.subscribe());
    let event_logger = tokio::spawn(log_events(session.subscribe()));

    let mut discovery = LanDiscovery::new(LanSettings::from_config(&config));
    tracing::info!(node = %discovery.node_id(), "node id assigned");
    let options = JoinOptions {
        discoverable: config.network.discoverable,
        announce: config.network.announce,
    };
    session
        .start(&mut discovery, topic, options)
        .context("failed to join network")?;

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── API ──────────────────────────────────────────────────────────────────
    let api_port = config.api.port;
    let api_task = {
        let state = helpnet_api::ApiState {
            session: session.clone(),
            network: config.network.name.clone(),
            feed,
        };
        tokio::spawn(async move {
            if let Err(e) = helpnet_api::serve(state, api_port).await {
                tracing::error!(error = %e, "API server failed");
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = api_task           => tracing::error!("API task exited: {:?}", r),
        r = event_logger       => tracing::error!("event logger exited: {:?}", r),
    }

    discovery.shutdown();
    session.shutdown().await;
    Ok(())
}

/// Mirror session events into the log.
async fn log_events(mut events: tokio::sync::broadcast::Receiver<SessionEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event logger fell behind");
                continue;
            }
            Err(RecvError::Closed) => return,
        };
        match event {
            SessionEvent::PeerCountChanged { count } => {
                tracing::info!(survivors = count, "survivor count changed");
            }
            SessionEvent::MessageReceived {
                kind: MessageKind::Sos,
                source,
                ..
            } => {
                tracing::warn!(source = ?source, "SOS");
            }
            SessionEvent::MessageReceived { kind, text, source } => {
                tracing::info!(?kind, ?source, text = %text, "message");
            }
            SessionEvent::SafeListChanged { names } => {
                tracing::info!(safe = names.len(), names = ?names, "safe list changed");
            }
            SessionEvent::PeerLocationUpdated { peer, lat, lng } => {
                tracing::debug!(%peer, lat, lng, "peer location");
            }
            SessionEvent::PeerLocationRemoved { peer } => {
                tracing::debug!(%peer, "peer location dropped");
            }
            SessionEvent::SessionFailed { reason } => {
                tracing::error!(reason = %reason, "session failed");
            }
        }
    }
}
