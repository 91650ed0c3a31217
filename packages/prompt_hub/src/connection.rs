use async_trait::async_trait;

use crate::error::HubError;

/// A full-duplex, message-framed transport registered with a [`Hub`].
///
/// Implementations must tolerate `send` and `recv` being called concurrently
/// from different tasks: the hub's receive loop sits in `recv` for the whole
/// life of the connection while broadcasts call `send`.
///
/// [`Hub`]: crate::Hub
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Send one message to the peer.
    async fn send(&self, payload: &[u8]) -> Result<(), HubError>;

    /// Wait for the next message from the peer.
    ///
    /// Returns [`HubError::ReceiveFailed`] once the peer has gone away; the
    /// hub stops reading from the connection after the first error.
    async fn recv(&self) -> Result<Vec<u8>, HubError>;

    /// Close the transport. Closing twice is not an error the hub cares about.
    async fn close(&self) -> Result<(), HubError>;
}
