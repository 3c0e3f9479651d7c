//! Connection lifecycle management.
//!
//! [`ConnectionManager`] owns the transport, drives connect/disconnect/
//! send/ping, and wires transport completions into the [`EventBus`] and the
//! receive loop.
//!
//! # Architecture
//!
//! ```text
//! caller ──connect()──► Connector::open ──► attempt task
//!                                               │
//!                            Connected event ◄──┤
//!                                               ▼
//!                                         receive loop
//!                            (one receive_once in flight at a time)
//!                                               │
//!                        Text / Data / Unknown ◄┤
//!                                               ▼
//!                          failure ──► classify ──► Disconnected event
//! ```
//!
//! # Terminal Guarantee
//!
//! Every connection attempt that starts ends with exactly one
//! `Disconnected` event, whether it failed to open, was closed by the peer,
//! failed mid-read, or was disconnected locally. A per-attempt guard makes
//! the terminal emission exactly-once and suppresses any message event that
//! races past it.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};
use url::Url;

use crate::bus::{EventBus, EventStream};
use crate::classify::classify;
use crate::error::{Error, Result};
use crate::event::{CloseCode, Disconnect, Event};
use crate::transport::{Connector, Frame, Transport, WsConnector};

// ============================================================================
// Constants
// ============================================================================

/// Close reason used when `disconnect` is called without one.
const DEFAULT_CLOSE_REASON: &str = "Closing connection";

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of the current connection attempt.
///
/// Strictly monotonic per attempt: `Idle -> Connecting -> Open -> Closed`.
/// A new `connect()` call starts a fresh attempt at `Connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection attempt has been made.
    Idle,
    /// An open handshake is in flight.
    Connecting,
    /// The connection is open.
    Open,
    /// The attempt ended.
    Closed,
}

impl ConnectionState {
    /// Returns `true` if the connection is currently open.
    #[inline]
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` if a new `connect()` call may start immediately
    /// without releasing a previous attempt.
    #[inline]
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Idle | Self::Closed)
    }
}

// ============================================================================
// Shared State
// ============================================================================

/// State shared between the manager handle and its attempt tasks.
struct Shared<T> {
    /// The event stream all subscribers observe.
    bus: EventBus,
    /// Lifecycle state, guarded together with the owned transport.
    inner: Mutex<Inner<T>>,
    /// Serializes the terminated-check against event emission, so no
    /// message event can be ordered after the attempt's terminal event.
    emit_lock: Mutex<()>,
}

/// Manager state guarded by a single lock.
struct Inner<T> {
    /// Current lifecycle state.
    state: ConnectionState,
    /// Monotonic attempt counter; stale attempts detect supersession.
    epoch: u64,
    /// The currently owned transport, present only while `Open`.
    active: Option<Active<T>>,
}

/// The owned transport of an open attempt.
struct Active<T> {
    /// The transport itself, shared with the receive loop.
    transport: Arc<T>,
    /// Flipped once when the attempt's terminal event is emitted.
    terminated: Arc<AtomicBool>,
}

impl<T> Shared<T> {
    /// Emits a message event unless the attempt is already terminal.
    ///
    /// Returns `false` without emitting when the attempt has ended.
    fn emit_message(&self, terminated: &AtomicBool, event: Event) -> bool {
        let _guard = self.emit_lock.lock();
        if terminated.load(Ordering::Acquire) {
            return false;
        }
        self.bus.emit(event);
        true
    }

    /// Emits the attempt's terminal event, exactly once.
    ///
    /// Returns `false` when another path already emitted it.
    fn emit_terminal(&self, terminated: &AtomicBool, reason: Disconnect) -> bool {
        let _guard = self.emit_lock.lock();
        if terminated.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.bus.emit(Event::Disconnected { reason });
        true
    }

    /// Emits the terminal event of an attempt that never opened.
    ///
    /// The epoch is re-checked under the emit lock so a superseding
    /// `connect()` that lands after the open failure cannot have its
    /// events interleaved with a stale terminal. Returns `false` when the
    /// attempt was superseded and nothing was emitted.
    fn emit_failed_open(&self, epoch: u64, reason: Disconnect) -> bool {
        let _guard = self.emit_lock.lock();
        {
            let mut inner = self.inner.lock();
            if inner.epoch != epoch {
                return false;
            }
            inner.state = ConnectionState::Closed;
        }
        self.bus.emit(Event::Disconnected { reason });
        true
    }

    /// Releases the owned transport if `epoch` is still the current attempt.
    fn release(&self, epoch: u64) {
        let mut inner = self.inner.lock();
        if inner.epoch == epoch {
            inner.active = None;
            inner.state = ConnectionState::Closed;
        }
    }
}

// ============================================================================
// ConnectionManager
// ============================================================================

/// Client-side WebSocket connection manager.
///
/// Converts the transport's one-message-per-read primitive into a single
/// ordered event stream. Cloning the manager shares the same connection and
/// the same bus.
///
/// # Example
///
/// ```no_run
/// use wscast::{ConnectionManager, Event};
///
/// #[tokio::main]
/// async fn main() -> wscast::Result<()> {
///     let manager = ConnectionManager::new();
///     let mut events = manager.subscribe();
///
///     manager.connect("ws://127.0.0.1:4455")?;
///
///     while let Some(event) = events.recv().await {
///         match event {
///             Event::Connected { protocol, .. } => println!("open: {protocol:?}"),
///             Event::Text(text) => println!("message: {text}"),
///             Event::Disconnected { reason } => {
///                 println!("closed: {reason:?}");
///                 break;
///             }
///             _ => {}
///         }
///     }
///
///     Ok(())
/// }
/// ```
pub struct ConnectionManager<C: Connector = WsConnector> {
    /// Opens transports for connection attempts.
    connector: Arc<C>,
    /// State shared with attempt tasks.
    shared: Arc<Shared<C::Transport>>,
}

impl<C: Connector> Clone for ConnectionManager<C> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl ConnectionManager<WsConnector> {
    /// Creates a manager using the tokio-tungstenite transport.
    #[must_use]
    pub fn new() -> Self {
        Self::with_connector(WsConnector)
    }
}

impl Default for ConnectionManager<WsConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> ConnectionManager<C> {
    /// Creates a manager using a custom connector.
    #[must_use]
    pub fn with_connector(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
            shared: Arc::new(Shared {
                bus: EventBus::new(),
                inner: Mutex::new(Inner {
                    state: ConnectionState::Idle,
                    epoch: 0,
                    active: None,
                }),
                emit_lock: Mutex::new(()),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Starts a connection attempt to `target`.
    ///
    /// Returns immediately; the outcome is observable on the event stream
    /// as either `Connected` or `Disconnected`. If a connection is still
    /// open, it is released first (emitting its own terminal event).
    ///
    /// # Errors
    ///
    /// [`Error::InvalidTarget`] if `target` is not a `ws://`/`wss://` URL.
    pub fn connect(&self, target: impl AsRef<str>) -> Result<()> {
        self.connect_with_headers(target, Vec::new())
    }

    /// Starts a connection attempt with additional handshake headers.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidTarget`] if `target` is not a `ws://`/`wss://` URL.
    pub fn connect_with_headers(
        &self,
        target: impl AsRef<str>,
        headers: Vec<(String, String)>,
    ) -> Result<()> {
        let target = target.as_ref();

        let parsed = Url::parse(target).map_err(|_| Error::invalid_target(target))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(Error::invalid_target(target));
        }

        // A previous open connection must be fully released before the
        // fresh attempt starts.
        self.disconnect();

        let epoch = {
            let mut inner = self.shared.inner.lock();
            inner.epoch += 1;
            inner.state = ConnectionState::Connecting;
            inner.epoch
        };

        debug!(%target, epoch, "starting connection attempt");

        let connector = Arc::clone(&self.connector);
        let shared = Arc::clone(&self.shared);
        let target = target.to_owned();

        tokio::spawn(async move {
            Self::run_attempt(connector, shared, epoch, target, headers).await;
        });

        Ok(())
    }

    /// Closes the connection with code 1000 and reason "Closing connection".
    ///
    /// Safe to call in any state; a no-op when no transport is owned.
    pub fn disconnect(&self) {
        self.disconnect_with(CloseCode::NORMAL, DEFAULT_CLOSE_REASON);
    }

    /// Closes the connection with the given code and reason.
    ///
    /// The close handshake is fire-and-forget: the owned transport is
    /// released and the terminal `Disconnected` event emitted before the
    /// handshake completes at the transport layer. Idempotent.
    pub fn disconnect_with(&self, code: CloseCode, reason: impl Into<String>) {
        let reason = reason.into();

        let active = {
            let mut inner = self.shared.inner.lock();
            let Some(active) = inner.active.take() else {
                trace!("disconnect with no owned transport, ignoring");
                return;
            };
            inner.state = ConnectionState::Closed;
            // Supersede the attempt so its dying receive loop cannot
            // clobber a newer attempt's state.
            inner.epoch += 1;
            active
        };

        debug!(%code, %reason, "disconnecting");

        // Emit the terminal first so the read failure caused by the close
        // below is suppressed rather than racing it.
        self.shared.emit_terminal(
            &active.terminated,
            Disconnect::closed(code, Some(reason.clone())),
        );

        let transport = active.transport;
        tokio::spawn(async move {
            transport.close(code, &reason).await;
        });
    }

    // ------------------------------------------------------------------
    // Messaging
    // ------------------------------------------------------------------

    /// Sends one message to the peer.
    ///
    /// # Errors
    ///
    /// - [`Error::NoActiveConnection`] if the connection is not open
    /// - [`Error::Send`] if the transport rejects the message
    pub async fn send(&self, frame: impl Into<Frame>) -> Result<()> {
        let transport = self.confirm_connection()?;
        transport.send(frame.into()).await.map_err(Error::Send)
    }

    /// Sends a text message to the peer.
    ///
    /// # Errors
    ///
    /// Same as [`ConnectionManager::send`].
    pub async fn send_text(&self, message: impl Into<String>) -> Result<()> {
        self.send(Frame::Text(message.into())).await
    }

    /// Sends a binary message to the peer.
    ///
    /// # Errors
    ///
    /// Same as [`ConnectionManager::send`].
    pub async fn send_binary(&self, message: impl Into<Vec<u8>>) -> Result<()> {
        self.send(Frame::Binary(message.into())).await
    }

    /// Sends a liveness probe and completes when the peer responds.
    ///
    /// # Errors
    ///
    /// - [`Error::NoActiveConnection`] if the connection is not open
    /// - [`Error::Ping`] if the probe fails
    pub async fn ping(&self) -> Result<()> {
        let transport = self.confirm_connection()?;
        transport.send_ping().await.map_err(Error::Ping)
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    /// Subscribes to the event stream.
    ///
    /// The stream yields the most recent event first, so a subscriber
    /// added after `Connected` observes `Connected` immediately.
    #[must_use]
    pub fn subscribe(&self) -> EventStream {
        self.shared.bus.subscribe()
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    /// Returns `true` while a connection is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Confirms there is an open connection, returning its transport.
    fn confirm_connection(&self) -> Result<Arc<C::Transport>> {
        let inner = self.shared.inner.lock();
        inner
            .active
            .as_ref()
            .map(|active| Arc::clone(&active.transport))
            .ok_or(Error::NoActiveConnection)
    }

    /// One connection attempt: open, then read until the attempt ends.
    async fn run_attempt(
        connector: Arc<C>,
        shared: Arc<Shared<C::Transport>>,
        epoch: u64,
        target: String,
        headers: Vec<(String, String)>,
    ) {
        match connector.open(&target, &headers).await {
            Ok((transport, handshake)) => {
                let transport = Arc::new(transport);
                let terminated = Arc::new(AtomicBool::new(false));

                // Keep the lock confined to a plain block: holding a guard
                // across an await would make this future non-Send.
                let superseded = {
                    let mut inner = shared.inner.lock();
                    if inner.epoch == epoch {
                        inner.state = ConnectionState::Open;
                        inner.active = Some(Active {
                            transport: Arc::clone(&transport),
                            terminated: Arc::clone(&terminated),
                        });
                        false
                    } else {
                        true
                    }
                };

                if superseded {
                    // Superseded while opening; discard quietly.
                    debug!(%target, epoch, "attempt superseded, closing transport");
                    transport
                        .close(CloseCode::NORMAL, DEFAULT_CLOSE_REASON)
                        .await;
                    return;
                }

                debug!(%target, "connection open");
                shared.emit_message(
                    &terminated,
                    Event::Connected {
                        protocol: handshake.protocol,
                        response_headers: handshake.response_headers,
                    },
                );

                Self::receive_loop(&shared, &transport, &target, &terminated, epoch).await;
            }

            Err(error) => {
                warn!(%target, error = %error, "connection attempt failed");
                let reason = classify(error, &target);

                if !shared.emit_failed_open(epoch, reason) {
                    debug!(%target, epoch, "failed attempt superseded, terminal suppressed");
                }
            }
        }
    }

    /// Sequential re-arming reader.
    ///
    /// One `receive_once` in flight at a time; an explicit loop rather than
    /// recursive re-arm, so stack depth stays constant per message. A
    /// failure is terminal for the attempt; the loop never restarts itself.
    async fn receive_loop(
        shared: &Shared<C::Transport>,
        transport: &C::Transport,
        target: &str,
        terminated: &AtomicBool,
        epoch: u64,
    ) {
        loop {
            match transport.receive_once().await {
                Ok(frame) => {
                    let event = match frame {
                        Frame::Text(text) => Event::Text(text),
                        Frame::Binary(bytes) => Event::Data(bytes),
                        other => Event::Unknown(other),
                    };

                    if !shared.emit_message(terminated, event) {
                        trace!("attempt already terminal, dropping frame");
                        break;
                    }
                }

                Err(error) => {
                    debug!(%target, error = %error, "receive loop ended");
                    let reason = classify(error, target);
                    shared.release(epoch);
                    shared.emit_terminal(terminated, reason);
                    break;
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
