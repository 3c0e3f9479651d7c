//! Production transport over tokio-tungstenite.
//!
//! [`WsConnector`] performs the client handshake with `connect_async`;
//! [`WsTransport`] wraps the resulting stream. The stream is split so one
//! write can run alongside the single in-flight read.
//!
//! # Platform Error Mapping
//!
//! An abrupt TCP reset surfaces from tungstenite either as
//! `Protocol(ResetWithoutClosingHandshake)` or as an I/O error with kind
//! `ConnectionReset`. Both are mapped to [`TransportError::Reset`] tagged
//! with this transport's target, which the classifier turns into an
//! abnormal-closure disconnect. Other transports may not expose an
//! equivalent signal.

// ============================================================================
// Imports
// ============================================================================

use std::io::ErrorKind;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, watch};
use tokio_tungstenite::tungstenite::client::ClientRequestBuilder;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::http::Uri;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::{Bytes, Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};

use crate::event::CloseCode;

use super::{Connector, Frame, Handshake, Transport, TransportError};

// ============================================================================
// Types
// ============================================================================

/// The underlying tokio-tungstenite stream type.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What the read path last observed about peer liveness.
///
/// Pending pings watch this value: a [`PongSignal::Pong`] completes them,
/// a [`PongSignal::Lost`] fails them instead of leaving them hanging on a
/// connection that can no longer produce a pong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PongSignal {
    /// No pong observed yet.
    Pending,
    /// A pong arrived at this instant.
    Pong(Instant),
    /// The read side failed; no further pong can arrive.
    Lost,
}

// ============================================================================
// WsConnector
// ============================================================================

/// Opens [`WsTransport`] connections via `connect_async`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn open(
        &self,
        target: &str,
        headers: &[(String, String)],
    ) -> Result<(WsTransport, Handshake), TransportError> {
        let uri: Uri = target
            .parse()
            .map_err(|_| TransportError::invalid_target(target))?;

        let mut request = ClientRequestBuilder::new(uri);
        for (name, value) in headers {
            request = request.with_header(name, value);
        }

        let (stream, response) = connect_async(request)
            .await
            .map_err(|e| map_ws_error(e, target))?;

        let protocol = response
            .headers()
            .get("sec-websocket-protocol")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let response_headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        debug!(%target, ?protocol, "websocket handshake completed");

        let transport = WsTransport::new(stream, target.to_owned());
        let handshake = Handshake {
            protocol,
            response_headers,
        };

        Ok((transport, handshake))
    }
}

// ============================================================================
// WsTransport
// ============================================================================

/// An open WebSocket connection.
///
/// The stream is split into halves behind separate async mutexes: the
/// manager's receive loop holds the read half for the duration of each
/// read, while `send`/`send_ping`/`close` share the write half.
pub struct WsTransport {
    /// Target this transport connected to, for reset classification.
    target: String,
    /// Write half, shared by send/ping/close.
    writer: Mutex<SplitSink<WsStream, Message>>,
    /// Read half, held by the single in-flight read.
    reader: Mutex<SplitStream<WsStream>>,
    /// Updated by the read path: pong arrivals and read failures.
    pong_tx: watch::Sender<PongSignal>,
    /// Cloned by `send_ping` to await the next signal.
    pong_rx: watch::Receiver<PongSignal>,
}

impl WsTransport {
    /// Wraps an established stream.
    fn new(stream: WsStream, target: String) -> Self {
        let (writer, reader) = stream.split();
        let (pong_tx, pong_rx) = watch::channel(PongSignal::Pending);

        Self {
            target,
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            pong_tx,
            pong_rx,
        }
    }

    /// Returns the target this transport connected to.
    #[inline]
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(bytes) => Message::Binary(bytes.into()),
            Frame::Ping(payload) => Message::Ping(payload.into()),
        };

        self.writer
            .lock()
            .await
            .send(message)
            .await
            .map_err(|e| map_ws_error(e, &self.target))
    }

    async fn receive_once(&self) -> Result<Frame, TransportError> {
        let mut reader = self.reader.lock().await;

        // Control frames are handled here so one call yields one message.
        loop {
            match reader.next().await {
                Some(Ok(Message::Text(text))) => {
                    trace!(len = text.len(), "received text frame");
                    return Ok(Frame::Text(text.as_str().to_owned()));
                }

                Some(Ok(Message::Binary(bytes))) => {
                    trace!(len = bytes.len(), "received binary frame");
                    return Ok(Frame::Binary(bytes.to_vec()));
                }

                // tungstenite queues the pong reply automatically.
                Some(Ok(Message::Ping(_))) => continue,

                Some(Ok(Message::Pong(_))) => {
                    let _ = self.pong_tx.send(PongSignal::Pong(Instant::now()));
                    continue;
                }

                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "received close frame");
                    let (code, reason) = match frame {
                        Some(frame) => {
                            let reason = if frame.reason.is_empty() {
                                None
                            } else {
                                Some(frame.reason.as_str().to_owned())
                            };
                            (CloseCode(u16::from(frame.code)), reason)
                        }
                        None => (CloseCode::NO_STATUS_RECEIVED, None),
                    };
                    let _ = self.pong_tx.send(PongSignal::Lost);
                    return Err(TransportError::closed(code, reason));
                }

                // Raw frames are not surfaced during normal reads.
                Some(Ok(Message::Frame(_))) => continue,

                Some(Err(e)) => {
                    let _ = self.pong_tx.send(PongSignal::Lost);
                    return Err(map_ws_error(e, &self.target));
                }

                None => {
                    let _ = self.pong_tx.send(PongSignal::Lost);
                    return Err(TransportError::ConnectionLost);
                }
            }
        }
    }

    async fn send_ping(&self) -> Result<(), TransportError> {
        let mut pong_rx = self.pong_rx.clone();

        // Mark the current signal as seen before sending, so a stale pong
        // cannot satisfy this probe. A read side that already failed means
        // no pong can ever arrive.
        if *pong_rx.borrow_and_update() == PongSignal::Lost {
            return Err(TransportError::ConnectionLost);
        }

        self.writer
            .lock()
            .await
            .send(Message::Ping(Bytes::new()))
            .await
            .map_err(|e| map_ws_error(e, &self.target))?;

        loop {
            pong_rx
                .changed()
                .await
                .map_err(|_| TransportError::ConnectionLost)?;

            match *pong_rx.borrow_and_update() {
                PongSignal::Pong(_) => return Ok(()),
                PongSignal::Lost => return Err(TransportError::ConnectionLost),
                PongSignal::Pending => {}
            }
        }
    }

    async fn close(&self, code: CloseCode, reason: &str) {
        let frame = CloseFrame {
            code: WsCloseCode::from(u16::from(code)),
            reason: reason.to_owned().into(),
        };

        if let Err(e) = self
            .writer
            .lock()
            .await
            .send(Message::Close(Some(frame)))
            .await
        {
            warn!(error = %e, "failed to send close frame");
        }
    }
}

// ============================================================================
// Error Mapping
// ============================================================================

/// Maps a tungstenite error to a [`TransportError`].
///
/// Connection resets are tagged with the failing target so the classifier
/// can match them against the original connection request.
fn map_ws_error(error: WsError, target: &str) -> TransportError {
    match error {
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            TransportError::reset(target)
        }
        WsError::Io(e) if e.kind() == ErrorKind::ConnectionReset => TransportError::reset(target),
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::ConnectionLost,
        other => TransportError::WebSocket(other),
    }
}

// ============================================================================
// Tests
// ============================================================================
