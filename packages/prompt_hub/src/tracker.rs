//! Prompt/response tracker
//!
//! A single mutex-guarded state machine coordinating one requester and one
//! responder. Every operation takes the lock for its whole duration and never
//! awaits while holding it, so tracker operations are totally ordered and
//! never wait on I/O.
//!
//! Admission failures are not errors for the caller to propagate: each
//! operation returns a [`Snapshot`] and a rejected request simply carries a
//! [`TrackerError`] in it.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::TrackerError;
use crate::message::StatusMessage;

/// Minimum time between a prompt or response change and the next prompt.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(3);

/// Lifecycle stage of the tracker.
///
/// The responder reports `Working` and `Ready` through heartbeats. Any other
/// string it reports is kept verbatim in `Other`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TrackerState {
    #[default]
    Ready,
    Waiting,
    Working,
    Other(String),
}

impl TrackerState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ready => "ready",
            Self::Waiting => "waiting",
            Self::Working => "working",
            Self::Other(state) => state,
        }
    }

    /// Whether this is one of the three states the server itself knows
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<&str> for TrackerState {
    fn from(state: &str) -> Self {
        match state {
            "ready" => Self::Ready,
            "waiting" => Self::Waiting,
            "working" => Self::Working,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for TrackerState {
    fn from(state: String) -> Self {
        match state.as_str() {
            "ready" | "waiting" | "working" => Self::from(state.as_str()),
            _ => Self::Other(state),
        }
    }
}

impl From<TrackerState> for String {
    fn from(state: TrackerState) -> Self {
        match state {
            TrackerState::Other(state) => state,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for TrackerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracker contents returned by every operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub prompt: String,
    pub response: String,
    pub state: TrackerState,
    /// Why the request was rejected; `None` when it was accepted
    pub error: Option<TrackerError>,
}

impl Snapshot {
    pub fn is_accepted(&self) -> bool {
        self.error.is_none()
    }

    pub fn to_message(&self) -> StatusMessage {
        StatusMessage {
            prompt: self.prompt.clone(),
            response: self.response.clone(),
            state: self.state.to_string(),
            error: self.error.as_ref().map(ToString::to_string),
        }
    }
}

struct TrackerInner {
    prompt: String,
    response: String,
    secret: String,
    state: TrackerState,
    last_touched: Option<Instant>,
    last_heartbeat: Option<Instant>,
}

impl TrackerInner {
    fn snapshot(&self, error: Option<TrackerError>) -> Snapshot {
        Snapshot {
            prompt: self.prompt.clone(),
            response: self.response.clone(),
            state: self.state.clone(),
            error,
        }
    }
}

/// The process-wide prompt/response coordinator.
///
/// Construct one at startup and share it by reference (`Arc<Tracker>`).
pub struct Tracker {
    inner: Mutex<TrackerInner>,
    debounce: Duration,
}

impl Tracker {
    /// Create a tracker in the `Ready` state guarded by `secret`
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(TrackerInner {
                prompt: String::new(),
                response: String::new(),
                secret: secret.into(),
                state: TrackerState::Ready,
                last_touched: None,
                last_heartbeat: None,
            }),
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    /// Override the window during which a new prompt is refused
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    // A panic while holding the lock cannot leave the fields half-written
    // (every write is a plain assignment), so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, TrackerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Submit a new prompt on behalf of the requester.
    ///
    /// Checks, first match wins: too soon after the last change, responder
    /// busy, prompt missing. On acceptance the prompt replaces the previous
    /// one, the response is cleared and the state becomes `Waiting`.
    pub fn submit_prompt(&self, prompt: Option<&str>) -> Snapshot {
        let mut inner = self.lock();
        let now = Instant::now();

        let admission = if inner
            .last_touched
            .is_some_and(|touched| now.duration_since(touched) < self.debounce)
        {
            Err(TrackerError::TooSoon)
        } else if inner.state == TrackerState::Working {
            Err(TrackerError::Busy)
        } else {
            required("prompt", prompt)
        };

        match admission {
            Ok(prompt) => {
                inner.prompt = prompt.to_string();
                inner.response.clear();
                inner.state = TrackerState::Waiting;
                inner.last_touched = Some(now);
                info!(prompt_len = prompt.len(), "prompt accepted");
                inner.snapshot(None)
            }
            Err(e) => {
                debug!(code = e.error_code(), "prompt rejected");
                inner.snapshot(Some(e))
            }
        }
    }

    /// Record a heartbeat from the responder.
    ///
    /// The new state is taken verbatim from the caller, including the empty
    /// string and strings outside the three known states.
    pub fn heartbeat(&self, secret: Option<&str>, state: Option<&str>) -> Snapshot {
        let mut inner = self.lock();

        if secret != Some(inner.secret.as_str()) {
            warn!("heartbeat rejected: provided secret is incorrect");
            return inner.snapshot(Some(TrackerError::Unauthorized));
        }
        let state = match present("state", state) {
            Ok(state) => TrackerState::from(state),
            Err(e) => {
                warn!("heartbeat rejected: {e}");
                return inner.snapshot(Some(e));
            }
        };

        if !state.is_known() {
            warn!(%state, "heartbeat reported an unrecognized state");
        }
        if inner.state != state {
            debug!(from = %inner.state, to = %state, "state changed by heartbeat");
        }
        inner.state = state;
        inner.last_heartbeat = Some(Instant::now());
        inner.snapshot(None)
    }

    /// Answer the pending prompt on behalf of the responder.
    ///
    /// The answer must name the prompt it responds to, so a responder racing
    /// a newer prompt is turned away. Fields only need to be present, so an
    /// empty response clears the previous one. State is left untouched and an
    /// earlier response may be overwritten.
    pub fn respond(
        &self,
        secret: Option<&str>,
        prompt: Option<&str>,
        response: Option<&str>,
    ) -> Snapshot {
        let mut inner = self.lock();

        let admission = present("prompt", prompt).and_then(|prompt| {
            let response = present("response", response)?;
            let secret = present("secret", secret)?;
            if prompt != inner.prompt {
                return Err(TrackerError::WrongPrompt);
            }
            if secret != inner.secret {
                return Err(TrackerError::Unauthorized);
            }
            Ok(response)
        });

        match admission {
            Ok(response) => {
                inner.response = response.to_string();
                inner.last_touched = Some(Instant::now());
                info!(response_len = response.len(), "response accepted");
                inner.snapshot(None)
            }
            Err(e) => {
                warn!(code = e.error_code(), "response rejected: {e}");
                inner.snapshot(Some(e))
            }
        }
    }

    /// Current contents, without any change
    pub fn status(&self) -> Snapshot {
        self.lock().snapshot(None)
    }

    /// Time since the last accepted heartbeat, if there ever was one
    pub fn heartbeat_age(&self) -> Option<Duration> {
        self.lock().last_heartbeat.map(|at| at.elapsed())
    }
}

/// Present and non-empty
fn required<'a>(field: &'static str, value: Option<&'a str>) -> Result<&'a str, TrackerError> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(TrackerError::MissingField(field)),
    }
}

/// Present, possibly empty
fn present<'a>(field: &'static str, value: Option<&'a str>) -> Result<&'a str, TrackerError> {
    value.ok_or(TrackerError::MissingField(field))
}
