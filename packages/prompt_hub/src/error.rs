use crate::hub::ConnectionId;

/// Errors raised by the connection hub and its transports
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// The connection handed to the hub cannot be registered
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Receiving from a transport failed (includes a peer close)
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
    /// Sending to a transport failed
    #[error("send failed: {0}")]
    SendFailed(String),
    /// No live connection is registered under this id
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),
    /// The hub has been shut down and accepts no new connections
    #[error("hub is shut down")]
    ShutDown,
}

/// Admission failures reported by the tracker.
///
/// The display strings are what requesters and responders see in the
/// `error` field of a status message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    #[error("request happened too soon")]
    TooSoon,

    #[error("request occurred while another is being computed")]
    Busy,

    #[error("request is missing {0} parameter")]
    MissingField(&'static str),

    #[error("request is not sending the correct secret")]
    Unauthorized,

    #[error("request is responding to the wrong prompt")]
    WrongPrompt,
}

impl TrackerError {
    pub fn error_code(&self) -> &str {
        match self {
            Self::TooSoon => "too_soon",
            Self::Busy => "busy",
            Self::MissingField(_) => "missing_field",
            Self::Unauthorized => "unauthorized",
            Self::WrongPrompt => "wrong_prompt",
        }
    }
}
