//! Error types for wscast.
//!
//! This module defines the errors returned directly to callers. Failures
//! that happen asynchronously inside the receive loop are never returned
//! here; they are broadcast on the event stream as
//! [`Event::Disconnected`](crate::Event::Disconnected).
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use wscast::{ConnectionManager, Result};
//!
//! async fn example(manager: &ConnectionManager) -> Result<()> {
//!     manager.send_text("hello").await?;
//!     manager.ping().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Precondition | [`Error::NoActiveConnection`], [`Error::InvalidTarget`] |
//! | Operation | [`Error::Send`], [`Error::Ping`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;

use crate::transport::TransportError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Only errors caused by a direct caller action appear here. Background
/// receive failures and close handshakes are observable exclusively through
/// the event stream.
#[derive(Error, Debug)]
pub enum Error {
    /// Operation attempted while no connection is open.
    ///
    /// Returned by `send`/`ping` when the manager is not in the `Open` state.
    #[error("no active connection")]
    NoActiveConnection,

    /// The connect target is not a valid `ws://` or `wss://` URL.
    #[error("invalid connection target: {target}")]
    InvalidTarget {
        /// The rejected target string.
        target: String,
    },

    /// Sending a message over the transport failed.
    ///
    /// Surfaced to the caller of `send`; never broadcast as an event.
    #[error("send failed: {0}")]
    Send(#[source] TransportError),

    /// Sending a liveness probe failed, or no response arrived.
    ///
    /// Surfaced to the caller of `ping`; never broadcast as an event.
    #[error("ping failed: {0}")]
    Ping(#[source] TransportError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates an invalid target error.
    #[inline]
    pub fn invalid_target(target: impl Into<String>) -> Self {
        Self::InvalidTarget {
            target: target.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a precondition failure rather than a
    /// transport failure.
    #[inline]
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::NoActiveConnection | Self::InvalidTarget { .. })
    }

    /// Returns `true` if this error carries an underlying transport failure.
    #[inline]
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Send(_) | Self::Ping(_))
    }
}

// ============================================================================
// Tests
// ============================================================================
