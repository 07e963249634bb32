//! # LogWriter: bus events to `tracing`
//!
//! A small consumer that drains a [`Bus`] and writes every [`Event`] through
//! `tracing`. Failures and rejections are logged at `warn`, everything else
//! at `debug`.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! DEBUG fluxgate: subscribed channel="orders" subscriber="billing"
//! DEBUG fluxgate: parked channel="orders" message_id=Some(12)
//!  WARN fluxgate: delivery-failed channel="orders" subscriber="billing" message_id=Some(12) reason="..."
//! ```

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Bus, Event, EventKind};

/// Event writer.
#[derive(Default, Debug, Clone, Copy)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Spawns a task that logs every event published on `bus`.
    ///
    /// The task ends once every clone of the bus has been dropped.
    pub fn spawn(self, bus: &Bus) -> JoinHandle<()> {
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => self.write(&ev),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(target: "fluxgate", skipped, "log writer lagged, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Writes a single event.
    pub fn write(&self, e: &Event) {
        let channel = e.channel.as_deref().unwrap_or("-");
        let subscriber = e.subscriber.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::Subscribed => {
                debug!(target: "fluxgate", seq = e.seq, channel, subscriber, "subscribed");
            }
            EventKind::SubscriptionCancelled => {
                debug!(target: "fluxgate", seq = e.seq, channel, subscriber, "cancelled");
            }
            EventKind::SubscriptionCompleted => {
                debug!(target: "fluxgate", seq = e.seq, channel, subscriber, "completed");
            }
            EventKind::SubscriptionErrored => {
                warn!(target: "fluxgate", seq = e.seq, channel, subscriber, message_id = ?e.message_id, reason, "errored");
            }
            EventKind::MessageParked => {
                debug!(target: "fluxgate", seq = e.seq, channel, message_id = ?e.message_id, "parked");
            }
            EventKind::MessageDelivered => {
                debug!(target: "fluxgate", seq = e.seq, channel, subscriber, message_id = ?e.message_id, "delivered");
            }
            EventKind::DeliveryFailed => {
                warn!(target: "fluxgate", seq = e.seq, channel, subscriber, message_id = ?e.message_id, reason, "delivery-failed");
            }
            EventKind::SendRejected => {
                warn!(target: "fluxgate", seq = e.seq, channel, message_id = ?e.message_id, reason, "send-rejected");
            }
            EventKind::SendTimedOut => {
                warn!(target: "fluxgate", seq = e.seq, channel, message_id = ?e.message_id, timeout_ms = ?e.timeout_ms, "send-timed-out");
            }
        }
    }
}
