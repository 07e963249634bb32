//! # Runtime events emitted by channels.
//!
//! The [`EventKind`] enum classifies event types across two categories:
//! - **Subscription events**: a subscriber attached, or its subscription ended
//! - **Delivery events**: what happened to a single `send`
//!
//! The [`Event`] struct carries additional metadata such as the channel name,
//! subscriber name, message id and failure reason.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use fluxgate::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::DeliveryFailed)
//!     .with_channel("orders")
//!     .with_subscriber("billing")
//!     .with_message(7)
//!     .with_reason("card declined");
//!
//! assert_eq!(ev.kind, EventKind::DeliveryFailed);
//! assert_eq!(ev.channel.as_deref(), Some("orders"));
//! assert_eq!(ev.message_id, Some(7));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscription events ===
    /// A subscriber attached to a channel.
    ///
    /// Sets: `channel`, `subscriber`
    Subscribed,

    /// A subscription was cancelled.
    ///
    /// Sets: `channel`, `subscriber`
    SubscriptionCancelled,

    /// The channel was completed while a subscription was active.
    ///
    /// Sets: `channel`, `subscriber`
    SubscriptionCompleted,

    /// A handling failure could not be returned to its sender and ended the subscription.
    ///
    /// Sets: `channel`, `subscriber`, `message_id`, `reason`
    SubscriptionErrored,

    // === Delivery events ===
    /// A message is waiting in the pending slot for demand.
    ///
    /// Sets: `channel`, `message_id`
    MessageParked,

    /// A message was handled successfully.
    ///
    /// Sets: `channel`, `subscriber`, `message_id`
    MessageDelivered,

    /// A handler failed on a message.
    ///
    /// Sets: `channel`, `subscriber`, `message_id`, `reason`
    DeliveryFailed,

    /// A send was rejected without reaching a handler (no subscriber, closed).
    ///
    /// Sets: `channel`, `message_id`, `reason`
    SendRejected,

    /// A send exceeded its deadline.
    ///
    /// Sets: `channel`, `message_id`, `timeout_ms`
    SendTimedOut,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the channel, if applicable.
    pub channel: Option<Arc<str>>,
    /// Name of the subscriber or handler, if applicable.
    pub subscriber: Option<Arc<str>>,
    /// Id of the message concerned, if applicable.
    pub message_id: Option<u64>,
    /// Human-readable reason (errors, rejection details).
    pub reason: Option<Arc<str>>,
    /// Send timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            channel: None,
            subscriber: None,
            message_id: None,
            reason: None,
            timeout_ms: None,
        }
    }

    /// Attaches a channel name.
    #[inline]
    pub fn with_channel(mut self, channel: impl Into<Arc<str>>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Attaches a subscriber name.
    #[inline]
    pub fn with_subscriber(mut self, subscriber: impl Into<Arc<str>>) -> Self {
        self.subscriber = Some(subscriber.into());
        self
    }

    /// Attaches a message id.
    #[inline]
    pub fn with_message(mut self, id: u64) -> Self {
        self.message_id = Some(id);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.timeout_ms = Some(ms);
        self
    }

    /// True for events that end a subscription.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriptionCancelled
                | EventKind::SubscriptionCompleted
                | EventKind::SubscriptionErrored
        )
    }
}
