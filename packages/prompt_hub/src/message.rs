//! Wire messages shared by the HTTP layer, websocket observers and responders.

use serde::{Deserialize, Serialize};

/// Status of the tracker as seen by requesters, responders and observers.
///
/// `error` is left out of the JSON entirely when the request was accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusMessage {
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn has_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.is_empty())
    }
}

/// Messages an observer may send over its websocket.
///
/// Fields are optional so that a missing field reaches the tracker and is
/// reported the same way as a missing form field over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask for the current status
    Status,
    /// Submit a new prompt
    Prompt {
        #[serde(default)]
        prompt: Option<String>,
    },
    /// Report the responder's state
    Heartbeat {
        #[serde(default)]
        secret: Option<String>,
        #[serde(default)]
        state: Option<String>,
    },
    /// Answer the pending prompt
    Respond {
        #[serde(default)]
        secret: Option<String>,
        #[serde(default)]
        prompt: Option<String>,
        #[serde(default)]
        response: Option<String>,
    },
}

impl ClientMessage {
    /// Short name for log lines; never includes field values.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Prompt { .. } => "prompt",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Respond { .. } => "respond",
        }
    }
}
