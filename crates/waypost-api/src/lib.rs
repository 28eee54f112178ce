//! waypost HTTP query and admin API.

pub mod handlers;

use std::future::Future;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;

pub use handlers::{ApiError, ApiState};

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/ping", get(handlers::handle_ping))
        .route("/info", get(handlers::handle_info))
        .route("/debug", get(handlers::handle_debug))
        .route("/lookup", get(handlers::handle_lookup))
        .route("/topics", get(handlers::handle_topics))
        .route("/channels", get(handlers::handle_channels))
        .route("/nodes", get(handlers::handle_nodes))
        .route("/topic/create", post(handlers::handle_topic_create))
        .route("/topic/delete", post(handlers::handle_topic_delete))
        .route("/topic/tombstone", post(handlers::handle_topic_tombstone))
        .route("/channel/create", post(handlers::handle_channel_create))
        .route("/channel/delete", post(handlers::handle_channel_delete))
        .with_state(state)
}

/// Serve the API on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: ApiState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(addr = %addr, "API listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
