//! Consumer of the hub's inbound event stream.
//!
//! Observers may send JSON [`ClientMessage`]s over their websocket. Each one
//! is applied through the same actions as the HTTP endpoints and the
//! resulting status is sent back to the connection it came from.

use prompt_hub::{ClientMessage, Event, StatusMessage};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{AppState, actions};

/// Drain `events` until cancelled or the hub goes away.
pub async fn run(state: AppState, mut events: mpsc::Receiver<Event>, cancel: CancellationToken) {
    info!("event consumer started");
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        handle_event(&state, event).await;
    }
    info!("event consumer stopped");
}

/// Apply one inbound message and reply to its sender
pub async fn handle_event(state: &AppState, event: Event) {
    state.metrics.event_received();

    let reply = match serde_json::from_slice::<ClientMessage>(&event.payload) {
        Ok(msg) => {
            debug!(source = %event.source, kind = msg.kind(), "observer message");
            apply(state, msg).await
        }
        Err(e) => {
            state.metrics.invalid_message();
            debug!(source = %event.source, "invalid observer message: {e}");
            StatusMessage {
                error: Some(format!("invalid message: {e}")),
                ..state.tracker.status().to_message()
            }
        }
    };

    let payload = match reply.to_json() {
        Ok(payload) => payload,
        Err(e) => {
            warn!("failed to encode reply: {e}");
            return;
        }
    };
    if let Err(e) = state.hub.send(event.source, &payload).await {
        debug!(source = %event.source, "reply not delivered: {e}");
    }
}

async fn apply(state: &AppState, msg: ClientMessage) -> StatusMessage {
    let snapshot = match msg {
        ClientMessage::Status => actions::status(state).await,
        ClientMessage::Prompt { prompt } => actions::submit_prompt(state, prompt.as_deref()).await,
        ClientMessage::Heartbeat {
            secret,
            state: new_state,
        } => actions::heartbeat(state, secret.as_deref(), new_state.as_deref()).await,
        ClientMessage::Respond {
            secret,
            prompt,
            response,
        } => {
            actions::respond(
                state,
                secret.as_deref(),
                prompt.as_deref(),
                response.as_deref(),
            )
            .await
        }
    };
    snapshot.to_message()
}
