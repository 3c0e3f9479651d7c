//! Socket transport abstraction.
//!
//! The manager consumes an abstract transport that can open, send one
//! message, issue one receive, send a liveness probe, and close with a
//! status code. The transport's read primitive completes after exactly one
//! message; the receive loop in
//! [`ConnectionManager`](crate::manager::ConnectionManager) re-arms it.
//!
//! # Connection Lifecycle
//!
//! 1. [`Connector::open`] - perform the handshake, yield a [`Transport`]
//! 2. [`Transport::receive_once`] - one inbound [`Frame`] per call
//! 3. [`Transport::send`] / [`Transport::send_ping`] - concurrent with reads
//! 4. [`Transport::close`] - fire-and-forget close handshake
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `tungstenite` | Production transport over tokio-tungstenite |

// ============================================================================
// Submodules
// ============================================================================

/// Production transport over tokio-tungstenite.
pub mod tungstenite;

// ============================================================================
// Re-exports
// ============================================================================

pub use tungstenite::{WsConnector, WsTransport};

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::event::CloseCode;

// ============================================================================
// Frame
// ============================================================================

/// One transport-level message unit.
///
/// Marked non-exhaustive: transports may grow new frame kinds, which the
/// receive loop surfaces as [`Event::Unknown`](crate::Event::Unknown).
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text message.
    Text(String),
    /// A binary message.
    Binary(Vec<u8>),
    /// A liveness probe from the peer, with its payload.
    Ping(Vec<u8>),
}

impl Frame {
    /// Returns `true` for a text frame.
    #[inline]
    #[must_use]
    pub const fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    /// Returns `true` for a binary frame.
    #[inline]
    #[must_use]
    pub const fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }
}

impl From<String> for Frame {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Frame {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Frame {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

impl From<&[u8]> for Frame {
    fn from(bytes: &[u8]) -> Self {
        Self::Binary(bytes.to_vec())
    }
}

// ============================================================================
// Handshake
// ============================================================================

/// Result of a successful open handshake.
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    /// Negotiated WebSocket subprotocol, if any.
    pub protocol: Option<String>,
    /// Handshake response headers in the order received.
    pub response_headers: Vec<(String, String)>,
}

// ============================================================================
// TransportError
// ============================================================================

/// A raw transport failure, before classification.
///
/// Produced by [`Transport`] implementations and mapped to a
/// [`Disconnect`](crate::Disconnect) by
/// [`classify`](crate::classify::classify) when it ends a connection.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The peer completed a close handshake.
    #[error("connection closed with code {code}")]
    Closed {
        /// Status code from the close frame.
        code: CloseCode,
        /// Optional close reason from the close frame.
        reason: Option<String>,
    },

    /// The peer reset the connection without a close handshake.
    #[error("connection reset by {target}")]
    Reset {
        /// Target the transport was connected to when the reset occurred.
        target: String,
    },

    /// The connection ended before a close handshake could complete.
    #[error("connection lost before a close handshake")]
    ConnectionLost,

    /// The transport rejected the connect target.
    #[error("transport rejected target: {target}")]
    InvalidTarget {
        /// The rejected target string.
        target: String,
    },

    /// Any other WebSocket-level failure (DNS, TLS, handshake, I/O).
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// TransportError Constructors
// ============================================================================

impl TransportError {
    /// Creates a graceful-close failure.
    #[inline]
    pub fn closed(code: CloseCode, reason: Option<String>) -> Self {
        Self::Closed { code, reason }
    }

    /// Creates a connection-reset failure.
    #[inline]
    pub fn reset(target: impl Into<String>) -> Self {
        Self::Reset {
            target: target.into(),
        }
    }

    /// Creates an invalid target failure.
    #[inline]
    pub fn invalid_target(target: impl Into<String>) -> Self {
        Self::InvalidTarget {
            target: target.into(),
        }
    }

    /// Returns `true` if this failure is a completed close handshake.
    #[inline]
    #[must_use]
    pub fn is_graceful(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }
}

// ============================================================================
// Transport Trait
// ============================================================================

/// An open full-duplex socket.
///
/// Implementations must support one concurrent write alongside one
/// concurrent read. The manager guarantees it never issues a second
/// `receive_once` before the first completes.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends one message to the peer.
    async fn send(&self, frame: Frame) -> Result<(), TransportError>;

    /// Receives exactly one message.
    ///
    /// Completes with a [`Frame`] on success, or with the failure that ended
    /// the connection. A close handshake surfaces as
    /// [`TransportError::Closed`].
    async fn receive_once(&self) -> Result<Frame, TransportError>;

    /// Sends a liveness probe and completes when the peer responds.
    async fn send_ping(&self) -> Result<(), TransportError>;

    /// Requests a close handshake with the given code and reason.
    ///
    /// Fire-and-forget: completion does not mean the handshake finished.
    async fn close(&self, code: CloseCode, reason: &str);
}

// ============================================================================
// Connector Trait
// ============================================================================

/// Opens new [`Transport`] instances.
///
/// The seam that lets tests drive the manager with a scripted transport.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The transport type this connector produces.
    type Transport: Transport;

    /// Opens a connection to `target`, sending `headers` with the handshake.
    async fn open(
        &self,
        target: &str,
        headers: &[(String, String)],
    ) -> Result<(Self::Transport, Handshake), TransportError>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_from_text() {
        assert_eq!(Frame::from("hi"), Frame::Text("hi".into()));
        assert!(Frame::from(String::from("hi")).is_text());
    }

    #[test]
    fn test_frame_from_bytes() {
        assert_eq!(Frame::from(vec![1u8, 2]), Frame::Binary(vec![1, 2]));
        assert!(Frame::from(&[1u8, 2][..]).is_binary());
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::closed(CloseCode::NORMAL, Some("bye".into()));
        assert_eq!(err.to_string(), "connection closed with code 1000");

        let err = TransportError::reset("ws://127.0.0.1:9000");
        assert_eq!(err.to_string(), "connection reset by ws://127.0.0.1:9000");
    }

    #[test]
    fn test_is_graceful() {
        assert!(TransportError::closed(CloseCode::NORMAL, None).is_graceful());
        assert!(!TransportError::ConnectionLost.is_graceful());
        assert!(!TransportError::reset("ws://x").is_graceful());
    }
}
