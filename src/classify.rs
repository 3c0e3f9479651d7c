//! Disconnect classification.
//!
//! Maps a raw [`TransportError`] into the [`Disconnect`] reason carried by
//! the terminal [`Event::Disconnected`](crate::Event::Disconnected) of a
//! connection attempt.
//!
//! # Classification Rules
//!
//! | Failure | Result |
//! |---------|--------|
//! | Close handshake with a status code | [`Disconnect::ClosedWithCode`] |
//! | Connection reset matching the connected target | [`Disconnect::TransportError`] tagged abnormal (1006) |
//! | Anything else | [`Disconnect::TransportError`], unclassified |

// ============================================================================
// Imports
// ============================================================================

use tracing::debug;

use crate::event::Disconnect;
use crate::transport::TransportError;

// ============================================================================
// Classifier
// ============================================================================

/// Classifies a transport failure into a disconnect reason.
///
/// `target` is the URL of the original connection request. A connection
/// reset is only treated as an abnormal closure when its failing target
/// matches; resets reported for any other target stay unclassified.
#[must_use]
pub fn classify(error: TransportError, target: &str) -> Disconnect {
    match error {
        TransportError::Closed { code, reason } => {
            debug!(%code, ?reason, "classified graceful close");
            Disconnect::closed(code, reason)
        }

        TransportError::Reset {
            target: ref failing,
        } if failing == target => {
            debug!(%target, "classified abrupt reset as abnormal closure");
            Disconnect::abnormal(error)
        }

        other => {
            debug!(error = %other, "unclassified transport failure");
            Disconnect::transport(other)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
