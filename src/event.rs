//! Event and close-reason types.
//!
//! [`Event`] is the only payload type flowing through the
//! [`EventBus`](crate::bus::EventBus). Every lifecycle transition and every
//! inbound message becomes one `Event` value; subscribers observe them in
//! production order.
//!
//! # Event Lifecycle
//!
//! ```text
//! Created ──connect()──► Connected ──frames──► Text / Data / Unknown ...
//!                            │
//!                            └──close / failure──► Disconnected (terminal)
//! ```
//!
//! A `Disconnected` event is an ordinary value, not a stream terminator:
//! the same manager (and the same bus) can be connected again afterwards.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::transport::{Frame, TransportError};

// ============================================================================
// CloseCode
// ============================================================================

/// A standardized WebSocket close status code (RFC 6455 section 7.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(pub u16);

impl CloseCode {
    /// Normal closure; the purpose for the connection has been fulfilled.
    pub const NORMAL: Self = Self(1000);
    /// Endpoint is going away (server shutdown, page navigation).
    pub const GOING_AWAY: Self = Self(1001);
    /// Protocol error detected by an endpoint.
    pub const PROTOCOL_ERROR: Self = Self(1002);
    /// Endpoint received a data type it cannot accept.
    pub const UNSUPPORTED_DATA: Self = Self(1003);
    /// Reserved: no status code was present in the close frame.
    pub const NO_STATUS_RECEIVED: Self = Self(1005);
    /// Reserved: connection dropped without a close frame.
    pub const ABNORMAL: Self = Self(1006);
    /// Server encountered an unexpected condition.
    pub const INTERNAL_ERROR: Self = Self(1011);

    /// Returns the numeric status code.
    #[inline]
    #[must_use]
    pub const fn code(self) -> u16 {
        self.0
    }

    /// Returns `true` for a normal closure.
    #[inline]
    #[must_use]
    pub const fn is_normal(self) -> bool {
        self.0 == Self::NORMAL.0
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.0
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Disconnect
// ============================================================================

/// Reason synthesized when the peer drops the connection without a close
/// handshake.
pub(crate) const NO_CLOSE_CODE_REASON: &str = "Server closed without a close code.";

/// The classified reason a connection ended.
///
/// Produced by [`classify`](crate::classify::classify) and carried by
/// [`Event::Disconnected`].
#[derive(Debug, Clone)]
pub enum Disconnect {
    /// The peer completed a close handshake with a status code.
    ClosedWithCode {
        /// Status code from the close frame.
        code: CloseCode,
        /// Optional close reason from the close frame.
        reason: Option<String>,
    },

    /// The transport failed without a close handshake.
    TransportError {
        /// [`CloseCode::ABNORMAL`] when the failure was a recognized
        /// connection reset against the connected target; `None` when
        /// unclassified.
        code: Option<CloseCode>,
        /// Synthesized human-readable reason for recognized resets.
        reason: Option<String>,
        /// The underlying transport failure.
        error: Arc<TransportError>,
    },
}

// ============================================================================
// Disconnect Constructors
// ============================================================================

impl Disconnect {
    /// Creates a graceful-close reason.
    #[inline]
    pub fn closed(code: CloseCode, reason: Option<String>) -> Self {
        Self::ClosedWithCode { code, reason }
    }

    /// Creates an abnormal-closure reason for a connection reset that matched
    /// the connected target.
    #[inline]
    pub fn abnormal(error: TransportError) -> Self {
        Self::TransportError {
            code: Some(CloseCode::ABNORMAL),
            reason: Some(NO_CLOSE_CODE_REASON.to_owned()),
            error: Arc::new(error),
        }
    }

    /// Creates an unclassified transport-failure reason.
    #[inline]
    pub fn transport(error: TransportError) -> Self {
        Self::TransportError {
            code: None,
            reason: None,
            error: Arc::new(error),
        }
    }
}

// ============================================================================
// Disconnect Accessors
// ============================================================================

impl Disconnect {
    /// Returns the close code, when one is known or synthesized.
    #[inline]
    #[must_use]
    pub fn close_code(&self) -> Option<CloseCode> {
        match self {
            Self::ClosedWithCode { code, .. } => Some(*code),
            Self::TransportError { code, .. } => *code,
        }
    }

    /// Returns the close reason, when one is known or synthesized.
    #[inline]
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::ClosedWithCode { reason, .. } | Self::TransportError { reason, .. } => {
                reason.as_deref()
            }
        }
    }

    /// Returns `true` if the connection ended with a close handshake.
    #[inline]
    #[must_use]
    pub fn is_graceful(&self) -> bool {
        matches!(self, Self::ClosedWithCode { .. })
    }
}

// ============================================================================
// Event
// ============================================================================

/// A value emitted on the connection's event stream.
///
/// Late subscribers always receive the most recent event first, so the
/// stream doubles as the connection's observable current status.
#[derive(Debug, Clone)]
pub enum Event {
    /// Emitted once when the manager is constructed, before any connection
    /// attempt. This is the value late subscribers see before `connect()`.
    Created,

    /// The connection opened successfully. Emitted exactly once per attempt.
    Connected {
        /// Negotiated WebSocket subprotocol, if any.
        protocol: Option<String>,
        /// Handshake response headers in the order received.
        response_headers: Vec<(String, String)>,
    },

    /// The connection attempt ended. Emitted exactly once per attempt that
    /// ends, including attempts that never opened.
    Disconnected {
        /// Why the connection ended.
        reason: Disconnect,
    },

    /// One inbound binary message.
    Data(Vec<u8>),

    /// One inbound text message.
    Text(String),

    /// Fallback for transport message kinds not otherwise modeled.
    Unknown(Frame),
}

impl Event {
    /// Returns `true` if this event ends a connection attempt.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected { .. })
    }

    /// Returns `true` if this event carries an inbound message payload.
    #[inline]
    #[must_use]
    pub fn is_message(&self) -> bool {
        matches!(self, Self::Data(_) | Self::Text(_) | Self::Unknown(_))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_code_display() {
        assert_eq!(CloseCode::NORMAL.to_string(), "1000");
        assert_eq!(CloseCode::from(4000).to_string(), "4000");
    }

    #[test]
    fn test_close_code_roundtrip() {
        let code = CloseCode::from(1001);
        assert_eq!(u16::from(code), 1001);
        assert_eq!(code, CloseCode::GOING_AWAY);
    }

    #[test]
    fn test_close_code_is_normal() {
        assert!(CloseCode::NORMAL.is_normal());
        assert!(!CloseCode::ABNORMAL.is_normal());
    }

    #[test]
    fn test_disconnect_graceful_accessors() {
        let reason = Disconnect::closed(CloseCode::NORMAL, Some("bye".into()));
        assert!(reason.is_graceful());
        assert_eq!(reason.close_code(), Some(CloseCode::NORMAL));
        assert_eq!(reason.reason(), Some("bye"));
    }

    #[test]
    fn test_disconnect_abnormal_is_tagged() {
        let reason = Disconnect::abnormal(TransportError::reset("ws://example.com"));
        assert!(!reason.is_graceful());
        assert_eq!(reason.close_code(), Some(CloseCode::ABNORMAL));
        assert_eq!(reason.reason(), Some(NO_CLOSE_CODE_REASON));
    }

    #[test]
    fn test_disconnect_unclassified_has_no_code() {
        let reason = Disconnect::transport(TransportError::ConnectionLost);
        assert_eq!(reason.close_code(), None);
        assert_eq!(reason.reason(), None);
    }

    #[test]
    fn test_event_predicates() {
        let terminal = Event::Disconnected {
            reason: Disconnect::closed(CloseCode::NORMAL, None),
        };
        assert!(terminal.is_terminal());
        assert!(!terminal.is_message());
        assert!(Event::Text("hi".into()).is_message());
        assert!(!Event::Created.is_message());
    }
}
