//! Ordered multi-subscriber event broadcast.
//!
//! [`EventBus`] delivers [`Event`] values to an open set of subscribers in
//! production order and replays the most recent event to each new
//! subscriber, so late subscribers observe the connection's current status
//! instead of missing history.
//!
//! The bus never terminates on its own: a `Disconnected` event is an
//! ordinary value, and the same bus keeps working across a
//! disconnect/reconnect cycle. A subscription ends only when its
//! [`EventStream`] is dropped, which is safe to do anywhere, including from
//! inside the loop that is consuming it.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::warn;

use crate::event::Event;

// ============================================================================
// Constants
// ============================================================================

/// Broadcast channel capacity per subscriber.
///
/// A subscriber that falls further behind than this skips ahead with a
/// warning rather than blocking producers.
const BROADCAST_CAPACITY: usize = 1024;

// ============================================================================
// EventBus
// ============================================================================

/// Ordered broadcast channel with replay-latest-on-subscribe semantics.
pub struct EventBus {
    /// Broadcast sender for live events.
    tx: broadcast::Sender<Event>,
    /// Most recently emitted event, replayed to new subscribers.
    ///
    /// Guarded by the same lock as `tx` sends so a subscriber's replayed
    /// value and its subscription point are always consistent.
    latest: Mutex<Event>,
}

impl EventBus {
    /// Creates a bus whose initial cached event is [`Event::Created`].
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);

        Self {
            tx,
            latest: Mutex::new(Event::Created),
        }
    }

    /// Emits an event to all current subscribers and caches it as latest.
    pub fn emit(&self, event: Event) {
        let mut latest = self.latest.lock();
        *latest = event.clone();
        // Send while holding the lock so emission order matches cache order.
        let _ = self.tx.send(event);
    }

    /// Subscribes to the bus.
    ///
    /// The returned stream yields the most recently emitted event first,
    /// then every future event in order. Dropping the stream unsubscribes.
    #[must_use]
    pub fn subscribe(&self) -> EventStream {
        let latest = self.latest.lock();

        EventStream {
            replay: Some(latest.clone()),
            rx: self.tx.subscribe(),
        }
    }

    /// Returns the number of current subscribers.
    #[inline]
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// EventStream
// ============================================================================

/// A single subscription to an [`EventBus`].
///
/// Created by [`EventBus::subscribe`]. Dropping the stream is the
/// unsubscribe operation.
pub struct EventStream {
    /// The cached latest event, delivered before any live event.
    replay: Option<Event>,
    /// Live events after the subscription point.
    rx: broadcast::Receiver<Event>,
}

impl EventStream {
    /// Receives the next event.
    ///
    /// Returns `None` only when the bus itself has been dropped. A
    /// subscriber that lagged past the channel capacity skips the missed
    /// events and keeps receiving from the oldest retained one.
    pub async fn recv(&mut self) -> Option<Event> {
        if let Some(event) = self.replay.take() {
            return Some(event);
        }

        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "subscriber lagged, skipping missed events");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Receives the next event without waiting.
    ///
    /// Returns `None` when no event is ready or the bus has been dropped.
    pub fn try_recv(&mut self) -> Option<Event> {
        if let Some(event) = self.replay.take() {
            return Some(event);
        }

        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(missed, "subscriber lagged, skipping missed events");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::event::{CloseCode, Disconnect};

    #[test]
    fn test_first_subscriber_sees_created() {
        let bus = EventBus::new();
        let mut stream = bus.subscribe();

        assert!(matches!(stream.try_recv(), Some(Event::Created)));
        assert!(stream.try_recv().is_none());
    }

    #[test]
    fn test_late_subscriber_replays_latest() {
        let bus = EventBus::new();
        bus.emit(Event::Connected {
            protocol: None,
            response_headers: Vec::new(),
        });

        let mut stream = bus.subscribe();
        assert!(matches!(stream.try_recv(), Some(Event::Connected { .. })));
        assert!(stream.try_recv().is_none());
    }

    #[test]
    fn test_delivery_preserves_order() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.emit(Event::Text("1".into()));
        bus.emit(Event::Data(vec![2]));
        bus.emit(Event::Text("3".into()));

        for stream in [&mut a, &mut b] {
            assert!(matches!(stream.try_recv(), Some(Event::Created)));
            assert!(matches!(stream.try_recv(), Some(Event::Text(t)) if t == "1"));
            assert!(matches!(stream.try_recv(), Some(Event::Data(d)) if d == vec![2]));
            assert!(matches!(stream.try_recv(), Some(Event::Text(t)) if t == "3"));
            assert!(stream.try_recv().is_none());
        }
    }

    #[test]
    fn test_disconnected_does_not_terminate_bus() {
        let bus = EventBus::new();
        let mut stream = bus.subscribe();

        bus.emit(Event::Disconnected {
            reason: Disconnect::closed(CloseCode::NORMAL, None),
        });
        bus.emit(Event::Text("after".into()));

        assert!(matches!(stream.try_recv(), Some(Event::Created)));
        assert!(matches!(stream.try_recv(), Some(Event::Disconnected { .. })));
        assert!(matches!(stream.try_recv(), Some(Event::Text(t)) if t == "after"));
    }

    #[test]
    fn test_drop_mid_iteration_is_safe() {
        let bus = EventBus::new();
        bus.emit(Event::Text("x".into()));

        let mut stream = bus.subscribe();
        while let Some(event) = stream.try_recv() {
            if matches!(event, Event::Text(_)) {
                break;
            }
        }
        drop(stream);

        // Emitting after a subscriber dropped must not fail.
        bus.emit(Event::Text("y".into()));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_async_recv_yields_replay_then_live() {
        let bus = EventBus::new();
        bus.emit(Event::Text("old".into()));

        let mut stream = bus.subscribe();
        assert!(matches!(stream.recv().await, Some(Event::Text(t)) if t == "old"));

        bus.emit(Event::Text("new".into()));
        assert!(matches!(stream.recv().await, Some(Event::Text(t)) if t == "new"));
    }

    #[tokio::test]
    async fn test_recv_returns_none_after_bus_dropped() {
        let bus = EventBus::new();
        let mut stream = bus.subscribe();
        assert!(matches!(stream.recv().await, Some(Event::Created)));

        drop(bus);
        assert!(stream.recv().await.is_none());
    }
}
