//! Prompted - relay one prompt at a time between a requester and a responder
//!
//! The requester submits a prompt over HTTP, the responder polls for it,
//! reports its progress through heartbeats and posts an answer. Websocket
//! observers connected at `/ws` receive a fresh status snapshot after every
//! state change and may drive the same operations with JSON messages.

use std::sync::Arc;

use axum::{Router, routing::get};
use prompt_hub::{Hub, Tracker};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::{MakeSpan, TraceLayer};
use uuid::Uuid;

pub mod actions;
pub mod config;
pub mod events;
pub mod handlers;
pub mod metrics;
pub mod responder;
mod views;
mod ws_connection;

#[cfg(test)]
mod test_helpers;

pub use ws_connection::WsConnection;

use crate::config::PromptedConfig;
use crate::metrics::ServerMetrics;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<Tracker>,
    pub hub: Hub,
    pub metrics: Arc<ServerMetrics>,
    pub config: Arc<PromptedConfig>,
}

impl AppState {
    pub fn new(config: PromptedConfig) -> Self {
        let tracker = Tracker::new(config.secret.clone()).with_debounce(config.debounce);
        Self {
            tracker: Arc::new(tracker),
            hub: Hub::new(config.event_capacity),
            metrics: Arc::new(ServerMetrics::new()),
            config: Arc::new(config),
        }
    }

    /// Start consuming inbound websocket messages.
    ///
    /// Returns `None` if the hub's event stream was already taken.
    pub fn spawn_event_consumer(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        let events = self.hub.take_events()?;
        Some(tokio::spawn(events::run(self.clone(), events, cancel)))
    }
}

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

/// Build the full router: tracker endpoints, observer websocket, health and
/// the front page.
pub fn app(state: AppState) -> Router {
    let app = Router::new()
        // Tracker endpoints (query string or form body)
        .route(
            "/prompt",
            get(handlers::prompt_handler).post(handlers::prompt_handler),
        )
        .route(
            "/heartbeat",
            get(handlers::heartbeat_handler).post(handlers::heartbeat_handler),
        )
        .route(
            "/respond",
            get(handlers::respond_handler).post(handlers::respond_handler),
        )
        .route(
            "/status",
            get(handlers::status_handler).post(handlers::status_handler),
        )
        // Observers
        .route("/ws", get(handlers::websocket_handler))
        // Health endpoints
        .route("/health", get(handlers::health_handler))
        .route("/health/live", get(handlers::health_live_handler))
        .route("/metrics", get(handlers::metrics_handler));

    let app = match &state.config.static_dir {
        Some(dir) => app.fallback_service(ServeDir::new(dir)),
        None => app.route("/", get(views::index_page)),
    };

    app.layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .with_state(state)
}
