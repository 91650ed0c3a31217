//! Prompt Hub - coordination core for a single outstanding prompt
//!
//! This crate holds the two stateful pieces of the prompted server:
//!
//! - [`Hub`]: the set of live duplex connections. It broadcasts outbound
//!   payloads to every member and funnels inbound payloads from all of them
//!   into one [`Event`] stream.
//! - [`Tracker`]: the prompt/response state machine shared by the requester
//!   and the responder, guarded by a single mutex.
//!
//! It has no HTTP dependencies. Transports plug in through the [`Connection`]
//! trait.
//!
//! # Example
//!
//! ```no_run
//! use prompt_hub::{Hub, Tracker};
//!
//! #[tokio::main]
//! async fn main() {
//!     let hub = Hub::default();
//!     let tracker = Tracker::new("8181");
//!
//!     let snapshot = tracker.submit_prompt(Some("hi"));
//!     assert!(snapshot.is_accepted());
//!
//!     let payload = tracker.status().to_message().to_json().unwrap();
//!     let report = hub.broadcast(&payload).await;
//!     println!("sent to {} observers", report.delivered());
//! }
//! ```

mod connection;
mod error;
pub mod hub;
pub mod message;
pub mod tracker;

pub use connection::Connection;
pub use error::{HubError, TrackerError};
pub use hub::{BroadcastReport, ConnectionId, Event, Hub};
pub use message::{ClientMessage, StatusMessage};
pub use tracker::{Snapshot, Tracker, TrackerState};
