//! helpnet-api: local HTTP API over a running session.
//!
//! Everything is served under `/api` on 127.0.0.1. Session events are also
//! streamed to clients as server-sent events on `/api/events`.

pub mod feed;
pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub use feed::{FeedEntry, MessageFeed};
pub use handlers::ApiState;

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handlers::handle_status))
        .route(
            "/messages",
            get(handlers::handle_get_messages).post(handlers::handle_send_message),
        )
        .route("/sos", post(handlers::handle_sos))
        .route("/safe", post(handlers::handle_safe))
        .route("/location", post(handlers::handle_location))
        .route("/events", get(handlers::handle_events))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(cors)
}

pub async fn serve(state: ApiState, port: u16) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!(port, "API listening on 127.0.0.1");
    axum::serve(listener, app).await?;
    Ok(())
}
