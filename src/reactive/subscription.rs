//! # Subscription handle and lifecycle state.
//!
//! A [`Subscription`] is handed to [`Subscriber::on_subscribe`](crate::Subscriber::on_subscribe)
//! and is the only way for the consumer to signal demand or stop the flow.
//!
//! ## Lifecycle
//! ```text
//! Unsubscribed ──► Active ──┬──► Completed  (channel completed)
//!                           ├──► Cancelled  (Subscription::cancel)
//!                           └──► Errored    (failure with no sender to report to)
//! ```
//! Terminal states are final; later transitions are ignored.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::bridge::Shared;

/// Outstanding demand of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Demand {
    /// Up to `n` more messages may be emitted.
    Bounded(u64),
    /// Every message may be emitted.
    Unbounded,
}

impl Demand {
    /// Adds `n` to the demand; overflow saturates to [`Demand::Unbounded`].
    pub fn add(self, n: u64) -> Self {
        match self {
            Demand::Unbounded => Demand::Unbounded,
            Demand::Bounded(cur) => cur.checked_add(n).map_or(Demand::Unbounded, Demand::Bounded),
        }
    }

    /// Consumes one unit of demand. Returns `false` if none is outstanding.
    pub fn try_take(&mut self) -> bool {
        match self {
            Demand::Unbounded => true,
            Demand::Bounded(0) => false,
            Demand::Bounded(n) => {
                *n -= 1;
                true
            }
        }
    }

    /// True if at least one message may be emitted.
    pub fn is_available(&self) -> bool {
        !matches!(self, Demand::Bounded(0))
    }
}

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Created, not yet attached.
    Unsubscribed,
    /// Attached and receiving.
    Active,
    /// The channel was completed.
    Completed,
    /// Cancelled by the consumer.
    Cancelled,
    /// Ended by a failure that could not be returned to a sender.
    Errored,
}

impl SubscriptionState {
    /// True for `Completed`, `Cancelled` and `Errored`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SubscriptionState::Completed | SubscriptionState::Cancelled | SubscriptionState::Errored
        )
    }
}

/// State shared by all clones of a subscription and the channel.
pub(crate) struct SubscriptionCell {
    pub(crate) id: u64,
    state: Mutex<SubscriptionState>,
    pub(crate) token: CancellationToken,
}

impl SubscriptionCell {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            state: Mutex::new(SubscriptionState::Unsubscribed),
            token: CancellationToken::new(),
        }
    }

    pub(crate) fn state(&self) -> SubscriptionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn activate(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == SubscriptionState::Unsubscribed {
            *state = SubscriptionState::Active;
        }
    }

    /// Moves an active subscription to `to` and cancels its token.
    ///
    /// Returns `false` if the subscription was not active.
    pub(crate) fn terminate(&self, to: SubscriptionState) -> bool {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != SubscriptionState::Active {
                return false;
            }
            *state = to;
        }
        self.token.cancel();
        true
    }
}

/// Handle through which a subscriber requests messages or cancels.
///
/// Cheap to clone; all clones control the same subscription.
pub struct Subscription<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    cell: Arc<SubscriptionCell>,
}

impl<T: Send + 'static> Clone for Subscription<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: Send + 'static> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.shared.name())
            .field("id", &self.cell.id)
            .field("state", &self.cell.state())
            .finish()
    }
}

impl<T: Send + 'static> Subscription<T> {
    pub(crate) fn new(shared: Arc<Shared<T>>, cell: Arc<SubscriptionCell>) -> Self {
        Self { shared, cell }
    }

    /// Signals readiness for `n` more messages.
    ///
    /// A parked message is emitted right away, on the calling task, and its
    /// sender is released with the handling outcome. `request(0)` is ignored.
    pub async fn request(&self, n: u64) {
        if n == 0 {
            warn!(channel = %self.shared.name(), subscription = self.cell.id, "request(0) ignored");
            return;
        }
        self.shared.request(&self.cell, |d| d.add(n)).await;
    }

    /// Switches to unbounded demand.
    pub async fn request_unbounded(&self) {
        self.shared.request(&self.cell, |_| Demand::Unbounded).await;
    }

    /// Cancels the subscription.
    ///
    /// A parked message is discarded and its sender fails with
    /// [`SendError::NoSubscriber`](crate::SendError::NoSubscriber). Idempotent.
    pub fn cancel(&self) {
        self.shared.cancel(&self.cell);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SubscriptionState {
        self.cell.state()
    }

    /// True once the subscription was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cell.state() == SubscriptionState::Cancelled
    }
}
