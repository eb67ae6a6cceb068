//! Realtime channel trait abstraction.
//!
//! Provides a trait-based abstraction for the persistent event channel,
//! enabling dependency injection and mocking in tests. A
//! [`ChannelConnector`] opens one [`ChannelTransport`] per connection
//! attempt; the channel manager owns the transport for its lifetime.

use async_trait::async_trait;

use crate::realtime::messages::{ClientFrame, ServerFrame};

/// Realtime channel errors. Never surfaced to users; the manager retries.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelError {
    /// Connection failed
    ConnectionFailed(String),
    /// Disconnected from server
    Disconnected,
    /// Failed to send a frame
    SendFailed(String),
    /// Server rejected the authentication handshake
    AuthRejected(String),
    /// Handshake or liveness timeout
    Timeout(String),
    /// No access token available for the handshake
    NotAuthenticated,
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelError::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            ChannelError::Disconnected => write!(f, "Disconnected from server"),
            ChannelError::SendFailed(msg) => write!(f, "Send failed: {}", msg),
            ChannelError::AuthRejected(msg) => write!(f, "Authentication rejected: {}", msg),
            ChannelError::Timeout(msg) => write!(f, "Channel timeout: {}", msg),
            ChannelError::NotAuthenticated => write!(f, "No credentials for channel handshake"),
        }
    }
}

impl std::error::Error for ChannelError {}

/// One open connection.
#[async_trait]
pub trait ChannelTransport: Send {
    /// Send a frame to the server.
    async fn send(&mut self, frame: ClientFrame) -> Result<(), ChannelError>;

    /// Receive the next frame. `None` means the server closed the connection.
    async fn recv(&mut self) -> Option<Result<ServerFrame, ChannelError>>;

    /// Close the connection. Errors are ignored.
    async fn close(&mut self);
}

/// Opens channel connections.
///
/// # Example
///
/// ```ignore
/// use pocketbank::traits::ChannelConnector;
///
/// async fn open<C: ChannelConnector>(connector: &C) {
///     let mut transport = connector.connect("wss://rt.example.com/ws").await?;
///     while let Some(frame) = transport.recv().await { /* ... */ }
/// }
/// ```
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn ChannelTransport>, ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_error_display() {
        assert_eq!(
            ChannelError::ConnectionFailed("refused".to_string()).to_string(),
            "Connection failed: refused"
        );
        assert_eq!(
            ChannelError::Disconnected.to_string(),
            "Disconnected from server"
        );
        assert_eq!(
            ChannelError::AuthRejected("expired".to_string()).to_string(),
            "Authentication rejected: expired"
        );
        assert_eq!(
            ChannelError::Timeout("handshake".to_string()).to_string(),
            "Channel timeout: handshake"
        );
    }

    #[test]
    fn test_channel_error_implements_error_trait() {
        let err = ChannelError::NotAuthenticated;
        let _: &dyn std::error::Error = &err;
    }
}
