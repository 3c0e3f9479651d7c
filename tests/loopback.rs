//! Loopback integration tests.
//!
//! Runs the real tokio-tungstenite transport against an in-process server
//! (`accept_async` on an ephemeral port), covering the paths the scripted
//! mock cannot reach: the client handshake, close-frame mapping, pong
//! handling, and peer-loss behavior.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;

use wscast::{
    CloseCode, ConnectionManager, Connector, Event, EventStream, Transport, WsConnector,
};

// ============================================================================
// Helpers
// ============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn next_event(stream: &mut EventStream) -> Event {
    timeout(Duration::from_secs(5), stream.recv())
        .await
        .expect("timed out waiting for event")
        .expect("bus dropped")
}

/// Binds an ephemeral listener and returns its `ws://` target.
async fn bind() -> Result<(TcpListener, String)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let target = format!("ws://{}", listener.local_addr()?);
    Ok((listener, target))
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_loopback_hello_then_server_close() -> Result<()> {
    init_tracing();
    let (listener, target) = bind().await?;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        ws.send(Message::Text("hello".into())).await.unwrap();
        ws.send(Message::Close(Some(CloseFrame {
            code: WsCloseCode::Normal,
            reason: "bye".into(),
        })))
        .await
        .unwrap();

        // Drain until the close handshake completes.
        while ws.next().await.is_some() {}
    });

    let manager = ConnectionManager::new();
    let mut events = manager.subscribe();
    manager.connect(&target)?;

    assert!(matches!(next_event(&mut events).await, Event::Created));
    match next_event(&mut events).await {
        Event::Connected {
            protocol,
            response_headers,
        } => {
            assert_eq!(protocol, None);
            assert!(!response_headers.is_empty());
        }
        other => panic!("expected Connected, got {other:?}"),
    }
    assert!(matches!(next_event(&mut events).await, Event::Text(t) if t == "hello"));

    match next_event(&mut events).await {
        Event::Disconnected { reason } => {
            assert!(reason.is_graceful());
            assert_eq!(reason.close_code(), Some(CloseCode::NORMAL));
            assert_eq!(reason.reason(), Some("bye"));
        }
        other => panic!("expected Disconnected, got {other:?}"),
    }

    assert!(!manager.is_connected());
    server.await?;
    Ok(())
}

#[tokio::test]
async fn test_loopback_echo_and_local_disconnect() -> Result<()> {
    init_tracing();
    let (listener, target) = bind().await?;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        // Echo data frames back until the client closes.
        while let Some(Ok(message)) = ws.next().await {
            match message {
                Message::Text(_) | Message::Binary(_) => ws.send(message).await.unwrap(),
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    let manager = ConnectionManager::new();
    let mut events = manager.subscribe();
    manager.connect(&target)?;

    assert!(matches!(next_event(&mut events).await, Event::Created));
    assert!(matches!(
        next_event(&mut events).await,
        Event::Connected { .. }
    ));

    manager.send_text("marco").await?;
    assert!(matches!(next_event(&mut events).await, Event::Text(t) if t == "marco"));

    manager.send_binary(vec![1, 2, 3]).await?;
    assert!(matches!(next_event(&mut events).await, Event::Data(d) if d == vec![1, 2, 3]));

    manager.disconnect();
    match next_event(&mut events).await {
        Event::Disconnected { reason } => {
            assert_eq!(reason.close_code(), Some(CloseCode::NORMAL));
            assert_eq!(reason.reason(), Some("Closing connection"));
        }
        other => panic!("expected Disconnected, got {other:?}"),
    }

    server.await?;
    Ok(())
}

#[tokio::test]
async fn test_loopback_ping_completes() -> Result<()> {
    init_tracing();
    let (listener, target) = bind().await?;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        // Keep polling: pings are answered while the stream is read.
        while let Some(Ok(message)) = ws.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    });

    let manager = ConnectionManager::new();
    let mut events = manager.subscribe();
    manager.connect(&target)?;

    assert!(matches!(next_event(&mut events).await, Event::Created));
    assert!(matches!(
        next_event(&mut events).await,
        Event::Connected { .. }
    ));

    timeout(Duration::from_secs(5), manager.ping())
        .await
        .expect("ping did not complete")?;

    manager.disconnect();
    server.await?;
    Ok(())
}

#[tokio::test]
async fn test_loopback_ping_fails_when_peer_vanishes() -> Result<()> {
    init_tracing();
    let (listener, target) = bind().await?;

    // Complete the handshake, then drop the socket without a close frame.
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        drop(ws);
    });

    let (transport, _) = WsConnector.open(&target, &[]).await?;
    let transport = Arc::new(transport);

    // Drive the read side so peer loss is observed.
    let reader = Arc::clone(&transport);
    tokio::spawn(async move {
        loop {
            if reader.receive_once().await.is_err() {
                break;
            }
        }
    });

    server.await?;

    // The ping must resolve with an error rather than waiting for a pong
    // that can never arrive.
    let result = timeout(Duration::from_secs(3), transport.send_ping())
        .await
        .expect("ping hung after the peer vanished");
    assert!(result.is_err());
    Ok(())
}
