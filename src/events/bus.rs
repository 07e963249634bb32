//! # Event bus for broadcasting channel events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] shared by every
//! channel that was given one via `with_bus`.
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; it calls `broadcast::Sender::send`.
//! - **Bounded capacity**: a single ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no active receivers at send time.

use tokio::sync::broadcast;

use crate::config::ChannelConfig;

use super::event::Event;

/// Broadcast channel for runtime events.
///
/// Multiple channels can publish concurrently; receivers get clones of each event.
/// Cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Creates a bus sized by [`ChannelConfig::bus_capacity`].
    pub fn from_config(cfg: &ChannelConfig) -> Self {
        Self::new(cfg.bus_capacity_clamped())
    }

    /// Publishes an event to all active receivers.
    ///
    /// If there are no receivers, the event is dropped.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn test_publish_reaches_receivers() {
        let bus = Bus::new(8);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.receiver_count(), 2);

        bus.publish(Event::new(EventKind::Subscribed).with_channel("c"));

        assert_eq!(rx1.recv().await.map(|e| e.kind).ok(), Some(EventKind::Subscribed));
        assert_eq!(rx2.recv().await.map(|e| e.kind).ok(), Some(EventKind::Subscribed));
    }

    #[test]
    fn test_publish_without_receivers_is_noop() {
        let bus = Bus::from_config(&ChannelConfig { bus_capacity: 0, ..ChannelConfig::default() });
        bus.publish(Event::new(EventKind::MessageDelivered));
        assert_eq!(bus.receiver_count(), 0);
    }
}
