//! Server metrics for observability
//!
//! Counters are plain atomics bumped from handlers and the event consumer.
//! The number of live observers is owned by the hub and passed in when a
//! snapshot is taken.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use prompt_hub::{BroadcastReport, Snapshot};

/// Server-wide metrics
#[derive(Debug, Default)]
pub struct ServerMetrics {
    /// Websocket observers accepted since server start
    pub total_connections: AtomicU64,

    // Tracker traffic
    pub prompts_accepted: AtomicU64,
    pub prompts_rejected: AtomicU64,
    pub responses_accepted: AtomicU64,
    pub responses_rejected: AtomicU64,
    pub heartbeats_accepted: AtomicU64,
    pub heartbeats_rejected: AtomicU64,

    // Fan-out
    pub broadcasts: AtomicU64,
    /// Individual sends that failed during a broadcast
    pub broadcast_send_failures: AtomicU64,

    // Inbound websocket traffic
    pub events_received: AtomicU64,
    pub invalid_messages: AtomicU64,

    /// Server start time (for uptime calculation)
    start_time: Option<Instant>,
}

fn record(snapshot: &Snapshot, accepted: &AtomicU64, rejected: &AtomicU64) {
    let counter = if snapshot.is_accepted() {
        accepted
    } else {
        rejected
    };
    counter.fetch_add(1, Ordering::Relaxed);
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn prompt(&self, snapshot: &Snapshot) {
        record(snapshot, &self.prompts_accepted, &self.prompts_rejected);
    }

    pub fn response(&self, snapshot: &Snapshot) {
        record(snapshot, &self.responses_accepted, &self.responses_rejected);
    }

    pub fn heartbeat(&self, snapshot: &Snapshot) {
        record(snapshot, &self.heartbeats_accepted, &self.heartbeats_rejected);
    }

    pub fn broadcast(&self, report: &BroadcastReport) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.broadcast_send_failures
            .fetch_add(report.failed as u64, Ordering::Relaxed);
    }

    pub fn event_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn invalid_message(&self) {
        self.invalid_messages.fetch_add(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    /// Create a snapshot of all metrics
    pub fn snapshot(&self, active_connections: u64) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: active_connections,
                total: load(&self.total_connections),
            },
            tracker: TrackerMetrics {
                prompts_accepted: load(&self.prompts_accepted),
                prompts_rejected: load(&self.prompts_rejected),
                responses_accepted: load(&self.responses_accepted),
                responses_rejected: load(&self.responses_rejected),
                heartbeats_accepted: load(&self.heartbeats_accepted),
                heartbeats_rejected: load(&self.heartbeats_rejected),
            },
            messages: MessageMetrics {
                broadcasts: load(&self.broadcasts),
                broadcast_send_failures: load(&self.broadcast_send_failures),
                events_received: load(&self.events_received),
                invalid: load(&self.invalid_messages),
            },
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub tracker: TrackerMetrics,
    pub messages: MessageMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerMetrics {
    pub prompts_accepted: u64,
    pub prompts_rejected: u64,
    pub responses_accepted: u64,
    pub responses_rejected: u64,
    pub heartbeats_accepted: u64,
    pub heartbeats_rejected: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetrics {
    pub broadcasts: u64,
    pub broadcast_send_failures: u64,
    pub events_received: u64,
    pub invalid: u64,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub connections: u64,
    pub uptime_secs: u64,
    pub responder: ResponderHealth,
}

/// What the server knows about the responder from its heartbeats
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponderHealth {
    pub state: String,
    /// Seconds since the last accepted heartbeat; absent if none was ever seen
    pub last_heartbeat_secs: Option<u64>,
}
