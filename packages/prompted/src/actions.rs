//! Tracker operations shared by the HTTP handlers and the websocket event
//! consumer.
//!
//! Each operation runs against the tracker, records metrics and then, for
//! state changes observers should see, broadcasts a fresh status snapshot.
//! The tracker lock is always released before broadcasting.

use prompt_hub::{BroadcastReport, Snapshot};
use tracing::warn;

use crate::AppState;

/// Submit a prompt. Observers are notified whether or not it was accepted.
pub async fn submit_prompt(state: &AppState, prompt: Option<&str>) -> Snapshot {
    let snapshot = state.tracker.submit_prompt(prompt);
    state.metrics.prompt(&snapshot);
    broadcast_status(state).await;
    snapshot
}

pub async fn heartbeat(
    state: &AppState,
    secret: Option<&str>,
    new_state: Option<&str>,
) -> Snapshot {
    let snapshot = state.tracker.heartbeat(secret, new_state);
    state.metrics.heartbeat(&snapshot);
    if snapshot.is_accepted() {
        broadcast_status(state).await;
    }
    snapshot
}

pub async fn respond(
    state: &AppState,
    secret: Option<&str>,
    prompt: Option<&str>,
    response: Option<&str>,
) -> Snapshot {
    let snapshot = state.tracker.respond(secret, prompt, response);
    state.metrics.response(&snapshot);
    if snapshot.is_accepted() {
        broadcast_status(state).await;
    }
    snapshot
}

/// Current status; also pushed to every observer.
pub async fn status(state: &AppState) -> Snapshot {
    let snapshot = state.tracker.status();
    broadcast_status(state).await;
    snapshot
}

/// Send the tracker's current status to every observer
pub async fn broadcast_status(state: &AppState) -> BroadcastReport {
    let payload = match state.tracker.status().to_message().to_json() {
        Ok(payload) => payload,
        Err(e) => {
            warn!("failed to encode status for broadcast: {e}");
            return BroadcastReport::default();
        }
    };

    let report = state.hub.broadcast(&payload).await;
    state.metrics.broadcast(&report);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{TEST_SECRET, test_app_state};
    use prompt_hub::{TrackerError, TrackerState};

    #[tokio::test]
    async fn test_prompt_counts_and_broadcasts_without_observers() {
        let state = test_app_state();

        let snapshot = submit_prompt(&state, Some("hi")).await;
        assert!(snapshot.is_accepted());
        let snapshot = submit_prompt(&state, Some("again")).await;
        assert_eq!(snapshot.error, Some(TrackerError::TooSoon));

        let metrics = state.metrics.snapshot(0);
        assert_eq!(metrics.tracker.prompts_accepted, 1);
        assert_eq!(metrics.tracker.prompts_rejected, 1);
        assert_eq!(metrics.messages.broadcasts, 2);
    }

    #[tokio::test]
    async fn test_rejected_heartbeat_does_not_broadcast() {
        let state = test_app_state();

        heartbeat(&state, Some("wrong"), Some("working")).await;
        assert_eq!(state.metrics.snapshot(0).messages.broadcasts, 0);

        let snapshot = heartbeat(&state, Some(TEST_SECRET), Some("working")).await;
        assert_eq!(snapshot.state, TrackerState::Working);
        assert_eq!(state.metrics.snapshot(0).messages.broadcasts, 1);
    }

    #[tokio::test]
    async fn test_rejected_respond_does_not_broadcast() {
        let state = test_app_state();
        submit_prompt(&state, Some("hi")).await;

        let snapshot = respond(&state, Some(TEST_SECRET), Some("nope"), Some("x")).await;
        assert_eq!(snapshot.error, Some(TrackerError::WrongPrompt));
        assert_eq!(state.metrics.snapshot(0).messages.broadcasts, 1);

        let snapshot = respond(&state, Some(TEST_SECRET), Some("hi"), Some("hello")).await;
        assert_eq!(snapshot.response, "hello");
        let metrics = state.metrics.snapshot(0);
        assert_eq!(metrics.messages.broadcasts, 2);
        assert_eq!(metrics.tracker.responses_accepted, 1);
        assert_eq!(metrics.tracker.responses_rejected, 1);
    }
}
