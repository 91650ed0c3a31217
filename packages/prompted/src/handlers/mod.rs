pub mod health;
pub mod tracker;
pub mod websocket;

// Re-export all handlers for easy route registration
pub use health::{health_handler, health_live_handler, metrics_handler};
pub use tracker::{heartbeat_handler, prompt_handler, respond_handler, status_handler};
pub use websocket::websocket_handler;
