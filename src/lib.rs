//! wscast - Ordered event stream over a client WebSocket connection.
//!
//! This library wraps a callback-quirky socket transport (one message per
//! read request) in a connection manager that emits a single ordered stream
//! of lifecycle and message events to any number of subscribers.
//!
//! # Architecture
//!
//! - [`ConnectionManager`] owns the transport and the lifecycle state
//!   machine (`Idle -> Connecting -> Open -> Closed`)
//! - A receive loop re-arms the transport's single-shot read, one in
//!   flight at a time
//! - [`EventBus`](bus::EventBus) broadcasts events in production order and
//!   replays the latest one to each new subscriber
//! - [`classify`](classify::classify) turns every way a connection can end
//!   into a typed [`Disconnect`] reason
//!
//! # Quick Start
//!
//! ```no_run
//! use wscast::{ConnectionManager, Event};
//!
//! #[tokio::main]
//! async fn main() -> wscast::Result<()> {
//!     let manager = ConnectionManager::new();
//!     let mut events = manager.subscribe();
//!
//!     manager.connect("ws://127.0.0.1:4455")?;
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             Event::Connected { .. } => manager.send_text("hello").await?,
//!             Event::Text(text) => println!("received: {text}"),
//!             Event::Disconnected { reason } => {
//!                 println!("disconnected: {reason:?}");
//!                 break;
//!             }
//!             _ => {}
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bus`] | Ordered broadcast with replay-latest-on-subscribe |
//! | [`classify`] | Disconnect-reason classification |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`event`] | Event, disconnect reason, and close code types |
//! | [`manager`] | Connection lifecycle state machine and receive loop |
//! | [`transport`] | Transport abstraction and tokio-tungstenite backend |
//!
//! # Guarantees
//!
//! - Events reach every subscriber in the exact order produced
//! - A subscriber added after `Connected` sees `Connected` immediately
//! - Every connection attempt that ends produces exactly one terminal
//!   `Disconnected` event
//! - Failures of `send`/`ping` go to their caller; background failures go
//!   to the event stream; nothing is silently dropped

// ============================================================================
// Modules
// ============================================================================

/// Ordered multi-subscriber event broadcast.
///
/// [`EventBus`](bus::EventBus) delivers events in production order and
/// replays the most recent one on subscribe.
pub mod bus;

/// Disconnect classification.
///
/// Maps raw transport failures to typed [`Disconnect`] reasons.
pub mod classify;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Event, disconnect reason, and close code types.
pub mod event;

/// Connection lifecycle management.
///
/// The state machine, the receive loop, and the public manager API.
pub mod manager;

/// Socket transport abstraction.
///
/// The [`Transport`]/[`Connector`] seam and its tokio-tungstenite backend.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Event types
pub use event::{CloseCode, Disconnect, Event};

// Bus types
pub use bus::{EventBus, EventStream};

// Manager types
pub use manager::{ConnectionManager, ConnectionState};

// Transport types
pub use transport::{Connector, Frame, Handshake, Transport, TransportError, WsConnector};

// Error types
pub use error::{Error, Result};
