//! # ReactiveChannel: push-style sends into a demand-driven subscriber.
//!
//! Producers call `send` from any number of tasks; a single [`Subscriber`]
//! pulls with [`Subscription::request`]. Nothing is buffered beyond one
//! parked message, so a slow subscriber makes producers wait.
//!
//! ## Architecture
//! ```text
//! send(msg) ──► gate (1 permit, FIFO) ──► demand? ──yes──► on_next(msg) on the sender's task
//!                                            │
//!                                            no
//!                                            ▼
//!                                    pending slot [msg + permit]
//!                                            │
//! request(n) ────────────────────────────────┴──► on_next(msg) on the requester's task
//!                                                        │
//! sender ◄───────────── outcome (oneshot) ◄──────────────┘
//! ```
//!
//! ## Rules
//! - **Single in-flight**: the admission permit is held until the message was
//!   handled, also while it sits in the pending slot.
//! - **Fairness**: blocked senders are admitted in the order they started waiting.
//! - **Fail fast**: without an active subscription `send` returns
//!   [`SendError::NoSubscriber`]; waiting senders are released the same way on cancel.
//! - **Timeouts**: a send whose deadline passes while parked withdraws its message.
//! - **Completion**: `complete()` waits for an `on_next` in progress before
//!   `on_complete` runs, so subscriber callbacks never overlap.
//! - **Errors**: a failing `on_next` is returned to the sender as
//!   `DeliveryError -> HandlingError -> cause`. If the sender is gone, the
//!   subscriber's `on_error` receives it and the subscription ends as `Errored`.
//! - A subscriber must not `send` to its own channel, or `complete()` it,
//!   from `on_next`: the delivery is still in progress, so that call waits forever.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use fluxgate::{BoxError, HandlerFn, HandlerSubscriber, Message, MessageChannel, ReactiveChannel};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let channel = ReactiveChannel::<u32>::new("numbers");
//! let print = HandlerFn::arc("print", |msg: Message<u32>| async move {
//!     println!("got {}", msg.payload());
//!     Ok::<_, BoxError>(())
//! });
//! channel.subscribe(HandlerSubscriber::<u32>::arc(print)).await.unwrap();
//!
//! channel.send(Message::new(7)).await.unwrap();
//! # }
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::channels::MessageChannel;
use crate::config::ChannelConfig;
use crate::error::{DeliveryError, HandlerPanic, HandlingError, SendError, SubscribeError};
use crate::events::{Bus, Event, EventKind};
use crate::message::Message;

use super::stream::BridgeStream;
use super::subscription::{Demand, SubscriptionCell, SubscriptionState};
use super::{Subscriber, Subscription};

type Outcome = Result<(), HandlingError>;

/// Channel bridging `send` to a single demand-driven [`Subscriber`].
pub struct ReactiveChannel<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    send_timeout: Option<Duration>,
}

/// State shared between the channel and its subscriptions.
pub(crate) struct Shared<T: Send + 'static> {
    name: Arc<str>,
    gate: Arc<Semaphore>,
    state: Mutex<State<T>>,
    idle: Notify,
    bus: OnceLock<Bus>,
}

struct State<T: Send + 'static> {
    active: Option<Active<T>>,
    pending: Option<Pending<T>>,
    closed: bool,
    delivering: bool,
    next_id: u64,
    next_ticket: u64,
}

struct Active<T: Send + 'static> {
    cell: Arc<SubscriptionCell>,
    subscriber: Arc<dyn Subscriber<T>>,
    demand: Demand,
}

/// The parked message. Owns the admission permit until it has been handled.
struct Pending<T> {
    ticket: u64,
    message: Message<T>,
    outcome: oneshot::Sender<Outcome>,
    permit: OwnedSemaphorePermit,
}

enum Route<T: Send + 'static> {
    Direct(Arc<dyn Subscriber<T>>, Message<T>, OwnedSemaphorePermit),
    Parked(u64, oneshot::Receiver<Outcome>),
}

impl<T: Send + 'static> ReactiveChannel<T> {
    /// Creates a channel whose sends wait without deadline.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self::with_config(name, &ChannelConfig::default())
    }

    /// Creates a channel using `send_timeout` from `cfg` as default deadline.
    pub fn with_config(name: impl Into<Arc<str>>, cfg: &ChannelConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                gate: Arc::new(Semaphore::new(1)),
                state: Mutex::new(State {
                    active: None,
                    pending: None,
                    closed: false,
                    delivering: false,
                    next_id: 0,
                    next_ticket: 0,
                }),
                idle: Notify::new(),
                bus: OnceLock::new(),
            }),
            send_timeout: cfg.send_deadline(),
        }
    }

    /// Publishes subscription and delivery events to `bus`.
    ///
    /// Only the first bus attached is kept.
    pub fn with_bus(self, bus: Bus) -> Self {
        let _ = self.shared.bus.set(bus);
        self
    }

    /// Channel name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// True while a subscription is active.
    pub fn has_subscriber(&self) -> bool {
        self.shared.lock().active.is_some()
    }

    /// True while a message waits for demand.
    pub fn has_pending(&self) -> bool {
        self.shared.lock().pending.is_some()
    }

    /// True once [`complete`](Self::complete) was called.
    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Attaches `subscriber` and calls its `on_subscribe`.
    ///
    /// Fails with [`SubscribeError::DoubleSubscription`] while another
    /// subscription is active, and with [`SubscribeError::Closed`] after
    /// [`complete`](Self::complete).
    pub async fn subscribe(
        &self,
        subscriber: Arc<dyn Subscriber<T>>,
    ) -> Result<Subscription<T>, SubscribeError> {
        let cell = {
            let mut st = self.shared.lock();
            if st.closed {
                return Err(SubscribeError::Closed {
                    channel: Arc::clone(&self.shared.name),
                });
            }
            if st.active.is_some() {
                warn!(channel = %self.shared.name, subscriber = subscriber.name(), "double subscription rejected");
                return Err(SubscribeError::DoubleSubscription {
                    channel: Arc::clone(&self.shared.name),
                });
            }
            st.next_id += 1;
            let cell = Arc::new(SubscriptionCell::new(st.next_id));
            cell.activate();
            st.active = Some(Active {
                cell: Arc::clone(&cell),
                subscriber: Arc::clone(&subscriber),
                demand: Demand::Bounded(0),
            });
            cell
        };

        debug!(channel = %self.shared.name, subscriber = subscriber.name(), subscription = cell.id, "subscribed");
        self.shared
            .publish(Event::new(EventKind::Subscribed).with_subscriber(subscriber.name()));

        let subscription = Subscription::new(Arc::clone(&self.shared), cell);
        subscriber.on_subscribe(subscription.clone()).await;
        Ok(subscription)
    }

    /// Subscribes a pull-based stream that requests one message per poll.
    ///
    /// Dropping the stream cancels its subscription.
    pub async fn subscribe_stream(&self) -> Result<BridgeStream<T>, SubscribeError> {
        let (feed, rx) = BridgeStream::feed();
        let subscription = self.subscribe(feed).await?;
        Ok(BridgeStream::new(subscription, rx))
    }

    /// Closes the channel.
    ///
    /// The active subscription ends as `Completed` and its subscriber's
    /// `on_complete` runs once any `on_next` in progress has returned. Parked
    /// and waiting senders, and every later send or subscribe, fail with
    /// `Closed`. Idempotent.
    pub async fn complete(&self) {
        let (active, pending) = {
            let mut st = self.shared.lock();
            if st.closed {
                return;
            }
            st.closed = true;
            (st.active.take(), st.pending.take())
        };
        self.shared.gate.close();
        drop(pending);
        debug!(channel = %self.shared.name, "channel completed");

        let Some(active) = active else {
            return;
        };
        self.shared.wait_idle().await;
        if active.cell.terminate(SubscriptionState::Completed) {
            self.shared.publish(
                Event::new(EventKind::SubscriptionCompleted)
                    .with_subscriber(active.subscriber.name()),
            );
            active.subscriber.on_complete().await;
        }
    }

    async fn send_inner(
        &self,
        message: Message<T>,
        deadline: Option<Duration>,
    ) -> Result<(), SendError> {
        let shared = &self.shared;
        let id = message.id();
        let (subscription, token) = match shared.attached() {
            Ok(attached) => attached,
            Err(err) => return Err(shared.rejected(id, err)),
        };
        let limit = deadline.map(|d| Instant::now() + d);

        let admission = async {
            let acquire = Arc::clone(&shared.gate).acquire_owned();
            match limit {
                Some(at) => tokio::time::timeout_at(at, acquire).await.ok(),
                None => Some(acquire.await),
            }
        };
        let admitted = tokio::select! {
            biased;
            () = token.cancelled() => Err(shared.rejection()),
            res = admission => match res {
                Some(Ok(permit)) => Ok(permit),
                Some(Err(_closed)) => Err(SendError::Closed { channel: Arc::clone(&shared.name) }),
                None => Err(shared.timeout_error(deadline)),
            },
        };
        let permit = match admitted {
            Ok(permit) => permit,
            Err(err) => return Err(shared.rejected(id, err)),
        };

        let route = shared.route(subscription, message, permit);
        match route {
            Err(err) => Err(shared.rejected(id, err)),
            Ok(Route::Direct(subscriber, message, permit)) => {
                let in_flight = InFlight(shared.as_ref());
                let outcome = shared.deliver(&subscriber, message).await;
                drop(in_flight);
                drop(permit);
                outcome.map_err(|e| SendError::Delivery(DeliveryError::new(Arc::clone(&shared.name), e)))
            }
            Ok(Route::Parked(ticket, mut rx)) => {
                debug!(channel = %shared.name, message_id = id, "message parked, waiting for demand");
                shared.publish(Event::new(EventKind::MessageParked).with_message(id));

                let received = match limit {
                    None => rx.await,
                    Some(at) => match tokio::time::timeout_at(at, &mut rx).await {
                        Ok(received) => received,
                        Err(_elapsed) => {
                            if shared.reclaim(ticket) {
                                return Err(shared.rejected(id, shared.timeout_error(deadline)));
                            }
                            // Already taken by a requester; the outcome follows.
                            rx.await
                        }
                    },
                };
                match received {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(SendError::Delivery(DeliveryError::new(Arc::clone(&shared.name), e))),
                    Err(_dropped) => Err(shared.rejected(id, shared.rejection())),
                }
            }
        }
    }
}

#[async_trait]
impl<T: Send + 'static> MessageChannel<T> for ReactiveChannel<T> {
    fn name(&self) -> &str {
        &self.shared.name
    }

    async fn send(&self, message: Message<T>) -> Result<(), SendError> {
        self.send_inner(message, self.send_timeout).await
    }

    async fn send_timeout(&self, message: Message<T>, timeout: Duration) -> Result<(), SendError> {
        self.send_inner(message, Some(timeout)).await
    }
}

impl<T: Send + 'static> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    fn publish(&self, ev: Event) {
        if let Some(bus) = self.bus.get() {
            bus.publish(ev.with_channel(Arc::clone(&self.name)));
        }
    }

    /// Id and cancellation token of the active subscription.
    fn attached(&self) -> Result<(u64, CancellationToken), SendError> {
        let st = self.lock();
        if st.closed {
            return Err(SendError::Closed {
                channel: Arc::clone(&self.name),
            });
        }
        match &st.active {
            Some(active) => Ok((active.cell.id, active.cell.token.clone())),
            None => Err(SendError::NoSubscriber {
                channel: Arc::clone(&self.name),
            }),
        }
    }

    /// Error for a send whose subscription went away.
    fn rejection(&self) -> SendError {
        let channel = Arc::clone(&self.name);
        if self.lock().closed {
            SendError::Closed { channel }
        } else {
            SendError::NoSubscriber { channel }
        }
    }

    fn timeout_error(&self, deadline: Option<Duration>) -> SendError {
        SendError::Timeout {
            channel: Arc::clone(&self.name),
            timeout: deadline.unwrap_or_default(),
        }
    }

    fn rejected(&self, message_id: u64, err: SendError) -> SendError {
        match &err {
            SendError::Timeout { timeout, .. } => {
                debug!(channel = %self.name, message_id, ?timeout, "send timed out");
                self.publish(
                    Event::new(EventKind::SendTimedOut)
                        .with_message(message_id)
                        .with_timeout(*timeout),
                );
            }
            _ => {
                debug!(channel = %self.name, message_id, reason = err.as_label(), "send rejected");
                self.publish(
                    Event::new(EventKind::SendRejected)
                        .with_message(message_id)
                        .with_reason(err.as_label()),
                );
            }
        }
        err
    }

    /// Hands an admitted message to the subscriber or parks it.
    fn route(
        &self,
        subscription: u64,
        message: Message<T>,
        permit: OwnedSemaphorePermit,
    ) -> Result<Route<T>, SendError> {
        let mut guard = self.lock();
        let st = &mut *guard;
        if st.closed {
            return Err(SendError::Closed {
                channel: Arc::clone(&self.name),
            });
        }
        let active = match st.active.as_mut() {
            Some(active) if active.cell.id == subscription => active,
            _ => {
                return Err(SendError::NoSubscriber {
                    channel: Arc::clone(&self.name),
                });
            }
        };
        if active.demand.try_take() {
            st.delivering = true;
            return Ok(Route::Direct(Arc::clone(&active.subscriber), message, permit));
        }

        debug_assert!(st.pending.is_none(), "pending slot occupied by an admitted send");
        st.next_ticket += 1;
        let ticket = st.next_ticket;
        let (tx, rx) = oneshot::channel();
        st.pending = Some(Pending {
            ticket,
            message,
            outcome: tx,
            permit,
        });
        Ok(Route::Parked(ticket, rx))
    }

    /// Withdraws the parked message if it is still the one identified by `ticket`.
    fn reclaim(&self, ticket: u64) -> bool {
        let reclaimed = {
            let mut st = self.lock();
            match st.pending.take() {
                Some(p) if p.ticket == ticket => Some(p),
                other => {
                    st.pending = other;
                    None
                }
            }
        };
        reclaimed.is_some()
    }

    async fn deliver(&self, subscriber: &Arc<dyn Subscriber<T>>, message: Message<T>) -> Outcome {
        let id = message.id();
        let fut = subscriber.on_next(message);
        let cause = match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(())) => {
                self.publish(
                    Event::new(EventKind::MessageDelivered)
                        .with_subscriber(subscriber.name())
                        .with_message(id),
                );
                return Ok(());
            }
            Ok(Err(cause)) => cause,
            Err(panic) => HandlerPanic::from_payload(panic.as_ref()).into(),
        };
        let err = HandlingError::new(subscriber.name(), cause);
        warn!(channel = %self.name, subscriber = subscriber.name(), message_id = id, error = %err, "delivery failed");
        self.publish(
            Event::new(EventKind::DeliveryFailed)
                .with_subscriber(subscriber.name())
                .with_message(id)
                .with_reason(err.to_string()),
        );
        Err(err)
    }

    /// Updates demand and emits the parked message if demand allows it.
    pub(crate) async fn request(
        &self,
        cell: &Arc<SubscriptionCell>,
        update: impl FnOnce(Demand) -> Demand,
    ) {
        let (subscriber, pending) = {
            let mut guard = self.lock();
            let st = &mut *guard;
            let active = match st.active.as_mut() {
                Some(active) if active.cell.id == cell.id => active,
                _ => return,
            };
            active.demand = update(active.demand);
            if st.pending.is_none() || !active.demand.try_take() {
                return;
            }
            let Some(pending) = st.pending.take() else {
                return;
            };
            st.delivering = true;
            (Arc::clone(&active.subscriber), pending)
        };
        let in_flight = InFlight(self);

        let Pending {
            message,
            outcome,
            permit,
            ..
        } = pending;
        let id = message.id();
        let result = self.deliver(&subscriber, message).await;
        drop(in_flight);
        if let Err(Err(err)) = outcome.send(result) {
            self.orphaned(cell, &subscriber, id, err).await;
        }
        drop(permit);
    }

    /// Waits until no `on_next` is in progress.
    async fn wait_idle(&self) {
        loop {
            let idle = self.idle.notified();
            if !self.lock().delivering {
                return;
            }
            idle.await;
        }
    }

    /// Ends the subscription after a failure whose sender is gone.
    async fn orphaned(
        &self,
        cell: &Arc<SubscriptionCell>,
        subscriber: &Arc<dyn Subscriber<T>>,
        message_id: u64,
        err: HandlingError,
    ) {
        warn!(channel = %self.name, subscriber = subscriber.name(), message_id, error = %err, "sender gone, subscription errored");
        let detached = {
            let mut st = self.lock();
            match st.active.take() {
                Some(active) if active.cell.id == cell.id => true,
                other => {
                    st.active = other;
                    false
                }
            }
        };
        if !detached || !cell.terminate(SubscriptionState::Errored) {
            return;
        }
        self.publish(
            Event::new(EventKind::SubscriptionErrored)
                .with_subscriber(subscriber.name())
                .with_message(message_id)
                .with_reason(err.to_string()),
        );
        subscriber.on_error(&err).await;
    }

    pub(crate) fn cancel(&self, cell: &Arc<SubscriptionCell>) {
        let (active, pending) = {
            let mut st = self.lock();
            match st.active.take() {
                Some(active) if active.cell.id == cell.id => (active, st.pending.take()),
                other => {
                    st.active = other;
                    return;
                }
            }
        };
        if !cell.terminate(SubscriptionState::Cancelled) {
            return;
        }
        let discarded = pending.as_ref().map(|p| p.message.id());
        debug!(channel = %self.name, subscriber = active.subscriber.name(), subscription = cell.id, ?discarded, "subscription cancelled");
        let mut ev = Event::new(EventKind::SubscriptionCancelled).with_subscriber(active.subscriber.name());
        if let Some(id) = discarded {
            ev = ev.with_message(id);
        }
        self.publish(ev);
        drop(pending);
    }
}

/// Marks the delivery in progress; clears the mark even if the delivering future is dropped.
struct InFlight<'a, T: Send + 'static>(&'a Shared<T>);

impl<T: Send + 'static> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        self.0.lock().delivering = false;
        self.0.idle.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::handlers::{HandlerFn, MessageHandler, ServiceActivator};
    use crate::message::ChannelRef;
    use crate::channels::{PollableChannel, QueueChannel};
    use crate::reactive::HandlerSubscriber;
    use futures::StreamExt;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::error::Error as StdError;
    use thiserror::Error;

    const WAIT: Duration = Duration::from_secs(5);

    #[derive(Error, Debug)]
    #[error("intentional")]
    struct Intentional;

    /// Records every callback and requests only what the test asks for.
    #[derive(Default)]
    struct Manual {
        subscription: Mutex<Option<Subscription<u32>>>,
        seen: Mutex<Vec<u32>>,
        errors: Mutex<Vec<String>>,
        completed: Mutex<usize>,
        fail_on: Option<u32>,
    }

    impl Manual {
        fn failing_on(n: u32) -> Self {
            Self {
                fail_on: Some(n),
                ..Self::default()
            }
        }

        fn subscription(&self) -> Subscription<u32> {
            self.subscription
                .lock()
                .unwrap()
                .clone()
                .expect("subscribed")
        }

        fn seen(&self) -> Vec<u32> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Subscriber<u32> for Manual {
        async fn on_subscribe(&self, subscription: Subscription<u32>) {
            *self.subscription.lock().unwrap() = Some(subscription);
        }

        async fn on_next(&self, message: Message<u32>) -> Result<(), BoxError> {
            let n = message.into_payload();
            if self.fail_on == Some(n) {
                return Err(Intentional.into());
            }
            self.seen.lock().unwrap().push(n);
            Ok(())
        }

        async fn on_error(&self, error: &(dyn StdError + Send + Sync + 'static)) {
            self.errors.lock().unwrap().push(error.to_string());
        }

        async fn on_complete(&self) {
            *self.completed.lock().unwrap() += 1;
        }

        fn name(&self) -> &str {
            "manual"
        }
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(WAIT, async {
            while !cond() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn test_send_without_subscriber_fails_fast() {
        let ch = ReactiveChannel::<u32>::new("input");
        let err = ch.send(Message::new(1)).await.expect_err("no subscriber");
        assert!(matches!(err, SendError::NoSubscriber { .. }));
    }

    #[tokio::test]
    async fn test_send_blocks_until_request() {
        let ch = Arc::new(ReactiveChannel::<u32>::new("input"));
        let sub = Arc::new(Manual::default());
        ch.subscribe(sub.clone()).await.expect("subscribe");

        let sender = tokio::spawn({
            let ch = Arc::clone(&ch);
            async move { ch.send(Message::new(1)).await }
        });
        wait_until(|| ch.has_pending()).await;
        assert!(sub.seen().is_empty());
        assert!(!sender.is_finished());

        sub.subscription().request(1).await;
        assert_eq!(sub.seen(), vec![1]);
        assert!(!ch.has_pending());
        tokio::time::timeout(WAIT, sender)
            .await
            .expect("released")
            .expect("join")
            .expect("delivered");
    }

    #[tokio::test]
    async fn test_outstanding_demand_delivers_on_sender() {
        let ch = ReactiveChannel::<u32>::new("input");
        let sub = Arc::new(Manual::default());
        let subscription = ch.subscribe(sub.clone()).await.expect("subscribe");
        subscription.request(2).await;

        ch.send(Message::new(1)).await.expect("send");
        ch.send(Message::new(2)).await.expect("send");
        assert_eq!(sub.seen(), vec![1, 2]);

        let err = ch
            .send_timeout(Message::new(3), Duration::from_millis(20))
            .await
            .expect_err("demand exhausted");
        assert!(matches!(err, SendError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_request_zero_is_ignored() {
        let ch = Arc::new(ReactiveChannel::<u32>::new("input"));
        let sub = Arc::new(Manual::default());
        ch.subscribe(sub.clone()).await.expect("subscribe");
        sub.subscription().request(0).await;

        let err = ch
            .send_timeout(Message::new(1), Duration::from_millis(20))
            .await
            .expect_err("no demand");
        assert!(matches!(err, SendError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_timeout_withdraws_parked_message() {
        let bus = Bus::new(32);
        let mut events = bus.subscribe();
        let cfg = ChannelConfig {
            send_timeout: Duration::from_millis(30),
            ..ChannelConfig::default()
        };
        let ch = ReactiveChannel::<u32>::with_config("input", &cfg).with_bus(bus);
        let sub = Arc::new(Manual::default());
        ch.subscribe(sub.clone()).await.expect("subscribe");

        let err = ch.send(Message::new(1)).await.expect_err("timeout");
        assert!(matches!(err, SendError::Timeout { timeout, .. } if timeout == Duration::from_millis(30)));
        assert!(!ch.has_pending());

        sub.subscription().request(1).await;
        assert!(sub.seen().is_empty());

        let mut kinds = Vec::new();
        while let Ok(ev) = events.try_recv() {
            kinds.push(ev.kind);
        }
        assert_eq!(
            kinds,
            vec![EventKind::Subscribed, EventKind::MessageParked, EventKind::SendTimedOut]
        );
    }

    #[tokio::test]
    async fn test_zero_timeout_needs_immediate_demand() {
        let ch = ReactiveChannel::<u32>::new("input");
        let sub = Arc::new(Manual::default());
        ch.subscribe(sub.clone()).await.expect("subscribe");

        let err = ch
            .send_timeout(Message::new(1), Duration::ZERO)
            .await
            .expect_err("no demand");
        assert!(matches!(err, SendError::Timeout { .. }));
        assert!(!ch.has_pending());

        sub.subscription().request(1).await;
        ch.send_timeout(Message::new(2), Duration::ZERO).await.expect("accepted at once");
        assert_eq!(sub.seen(), vec![2]);
    }

    #[tokio::test]
    async fn test_double_subscription_rejected() {
        let ch = ReactiveChannel::<u32>::new("input");
        let first = Arc::new(Manual::default());
        ch.subscribe(first.clone()).await.expect("subscribe");

        let err = ch
            .subscribe(Arc::new(Manual::default()))
            .await
            .expect_err("second subscriber");
        assert!(matches!(err, SubscribeError::DoubleSubscription { .. }));

        first.subscription().request(1).await;
        ch.send(Message::new(5)).await.expect("first still attached");
        assert_eq!(first.seen(), vec![5]);
    }

    #[tokio::test]
    async fn test_cancel_releases_parked_sender() {
        let ch = Arc::new(ReactiveChannel::<u32>::new("input"));
        let sub = Arc::new(Manual::default());
        ch.subscribe(sub.clone()).await.expect("subscribe");

        let sender = tokio::spawn({
            let ch = Arc::clone(&ch);
            async move { ch.send(Message::new(1)).await }
        });
        wait_until(|| ch.has_pending()).await;

        let subscription = sub.subscription();
        subscription.cancel();
        subscription.cancel();
        assert!(subscription.is_cancelled());
        assert!(!ch.has_subscriber());

        let res = tokio::time::timeout(WAIT, sender).await.expect("released").expect("join");
        assert!(matches!(res, Err(SendError::NoSubscriber { .. })));
        assert!(sub.seen().is_empty());

        let err = ch.send(Message::new(2)).await.expect_err("cancelled");
        assert!(matches!(err, SendError::NoSubscriber { .. }));
    }

    #[tokio::test]
    async fn test_cancel_releases_waiting_sender() {
        let ch = Arc::new(ReactiveChannel::<u32>::new("input"));
        let sub = Arc::new(Manual::default());
        ch.subscribe(sub.clone()).await.expect("subscribe");

        let parked = tokio::spawn({
            let ch = Arc::clone(&ch);
            async move { ch.send(Message::new(1)).await }
        });
        wait_until(|| ch.has_pending()).await;
        let waiting = tokio::spawn({
            let ch = Arc::clone(&ch);
            async move { ch.send(Message::new(2)).await }
        });
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        assert!(!waiting.is_finished());

        sub.subscription().cancel();

        for sender in [parked, waiting] {
            let res = tokio::time::timeout(WAIT, sender).await.expect("released").expect("join");
            assert!(matches!(res, Err(SendError::NoSubscriber { .. })));
        }
        assert!(sub.seen().is_empty());
    }

    #[tokio::test]
    async fn test_resubscribe_after_cancel() {
        let ch = ReactiveChannel::<u32>::new("input");
        let first = Arc::new(Manual::default());
        ch.subscribe(first.clone()).await.expect("subscribe");
        first.subscription().cancel();

        let second = Arc::new(Manual::default());
        let subscription = ch.subscribe(second.clone()).await.expect("resubscribe");
        subscription.request_unbounded().await;
        ch.send(Message::new(9)).await.expect("send");

        assert_eq!(second.seen(), vec![9]);
        assert!(first.seen().is_empty());
        assert_eq!(first.subscription().state(), SubscriptionState::Cancelled);
    }

    #[tokio::test]
    async fn test_complete_closes_channel() {
        let ch = Arc::new(ReactiveChannel::<u32>::new("input"));
        let sub = Arc::new(Manual::default());
        ch.subscribe(sub.clone()).await.expect("subscribe");

        let sender = tokio::spawn({
            let ch = Arc::clone(&ch);
            async move { ch.send(Message::new(1)).await }
        });
        wait_until(|| ch.has_pending()).await;

        ch.complete().await;
        ch.complete().await;
        assert!(ch.is_closed());
        assert_eq!(*sub.completed.lock().unwrap(), 1);
        assert_eq!(sub.subscription().state(), SubscriptionState::Completed);

        let res = tokio::time::timeout(WAIT, sender).await.expect("released").expect("join");
        assert!(matches!(res, Err(SendError::Closed { .. })));
        assert!(matches!(
            ch.send(Message::new(2)).await,
            Err(SendError::Closed { .. })
        ));
        assert!(matches!(
            ch.subscribe(Arc::new(Manual::default())).await,
            Err(SubscribeError::Closed { .. })
        ));
    }

    /// Takes 100ms per message and records whether `on_complete` overlapped it.
    #[derive(Default)]
    struct Slow {
        in_next: AtomicBool,
        overlapped: AtomicBool,
        completed: AtomicBool,
    }

    #[async_trait]
    impl Subscriber<u32> for Slow {
        async fn on_subscribe(&self, subscription: Subscription<u32>) {
            subscription.request_unbounded().await;
        }

        async fn on_next(&self, _message: Message<u32>) -> Result<(), BoxError> {
            self.in_next.store(true, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.in_next.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn on_complete(&self) {
            if self.in_next.load(Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            self.completed.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_complete_waits_for_delivery_in_progress() {
        let ch = Arc::new(ReactiveChannel::<u32>::new("input"));
        let sub = Arc::new(Slow::default());
        ch.subscribe(sub.clone()).await.expect("subscribe");

        let sender = tokio::spawn({
            let ch = Arc::clone(&ch);
            async move { ch.send(Message::new(1)).await }
        });
        wait_until(|| sub.in_next.load(Ordering::SeqCst)).await;

        ch.complete().await;
        assert!(sub.completed.load(Ordering::SeqCst));
        assert!(!sub.overlapped.load(Ordering::SeqCst));

        let res = tokio::time::timeout(WAIT, sender).await.expect("released").expect("join");
        assert!(res.is_ok());
        assert!(matches!(ch.send(Message::new(2)).await, Err(SendError::Closed { .. })));
    }

    #[tokio::test]
    async fn test_complete_after_dropped_delivery() {
        let ch = Arc::new(ReactiveChannel::<u32>::new("input"));
        let sub = Arc::new(Slow::default());
        ch.subscribe(sub.clone()).await.expect("subscribe");

        let sender = tokio::spawn({
            let ch = Arc::clone(&ch);
            async move { ch.send(Message::new(1)).await }
        });
        wait_until(|| sub.in_next.load(Ordering::SeqCst)).await;
        sender.abort();
        let _ = sender.await;

        tokio::time::timeout(WAIT, ch.complete()).await.expect("not stuck");
        assert!(sub.completed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failure_is_returned_to_its_sender_only() {
        let ch = ReactiveChannel::<u32>::new("input");
        let sub = Arc::new(Manual::failing_on(2));
        ch.subscribe(sub.clone()).await.expect("subscribe");
        sub.subscription().request_unbounded().await;

        ch.send(Message::new(1)).await.expect("ok");
        let err = ch.send(Message::new(2)).await.expect_err("fails");
        ch.send(Message::new(3)).await.expect("bridge still usable");

        let delivery = err.as_delivery().expect("delivery");
        assert_eq!(delivery.channel(), "input");
        assert_eq!(delivery.handling().handler(), "manual");
        assert!(delivery.root_cause().downcast_ref::<Intentional>().is_some());
        assert_eq!(sub.seen(), vec![1, 3]);
        assert!(sub.errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_panicking_subscriber_is_reported() {
        let ch = ReactiveChannel::<u32>::new("input");
        let handler = HandlerFn::arc("panics", |msg: Message<u32>| async move {
            if *msg.payload() == 0 {
                panic!("zero");
            }
            Ok::<_, BoxError>(())
        });
        ch.subscribe(HandlerSubscriber::<u32>::arc(handler)).await.expect("subscribe");

        let err = ch.send(Message::new(0)).await.expect_err("panic");
        let root = err.as_delivery().expect("delivery").root_cause();
        assert_eq!(
            root.downcast_ref::<HandlerPanic>().map(|p| p.info.as_str()),
            Some("zero")
        );
        ch.send(Message::new(1)).await.expect("still usable");
    }

    #[tokio::test]
    async fn test_orphaned_failure_errors_subscription() {
        let ch = Arc::new(ReactiveChannel::<u32>::new("input"));
        let sub = Arc::new(Manual::failing_on(4));
        ch.subscribe(sub.clone()).await.expect("subscribe");

        let sender = tokio::spawn({
            let ch = Arc::clone(&ch);
            async move { ch.send(Message::new(4)).await }
        });
        wait_until(|| ch.has_pending()).await;
        sender.abort();
        let _ = sender.await;

        let subscription = sub.subscription();
        subscription.request(1).await;

        assert_eq!(subscription.state(), SubscriptionState::Errored);
        assert!(!ch.has_subscriber());
        let errors = sub.errors.lock().unwrap().clone();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("intentional"));

        let next = Arc::new(Manual::default());
        ch.subscribe(next).await.expect("new subscriber after error");
    }

    #[tokio::test]
    async fn test_waiting_senders_admitted_in_order() {
        let ch = Arc::new(ReactiveChannel::<u32>::new("input"));
        let sub = Arc::new(Manual::default());
        ch.subscribe(sub.clone()).await.expect("subscribe");

        let mut senders = Vec::new();
        for n in 0..4 {
            let ch = Arc::clone(&ch);
            senders.push(tokio::spawn(async move { ch.send(Message::new(n)).await }));
            for _ in 0..8 {
                tokio::task::yield_now().await;
            }
        }

        let subscription = sub.subscription();
        for _ in 0..4 {
            wait_until(|| ch.has_pending()).await;
            subscription.request(1).await;
        }
        for sender in senders {
            tokio::time::timeout(WAIT, sender)
                .await
                .expect("released")
                .expect("join")
                .expect("delivered");
        }
        assert_eq!(sub.seen(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_stream_consumer_pulls_one_at_a_time() {
        let ch = Arc::new(ReactiveChannel::<u32>::new("input"));
        let mut stream = ch.subscribe_stream().await.expect("subscribe");

        let producer = tokio::spawn({
            let ch = Arc::clone(&ch);
            async move {
                for n in 0..3 {
                    ch.send(Message::new(n)).await?;
                }
                Ok::<_, SendError>(())
            }
        });

        let mut got = Vec::new();
        for _ in 0..3 {
            let msg = tokio::time::timeout(WAIT, stream.next())
                .await
                .expect("in time")
                .expect("item");
            got.push(msg.into_payload());
        }
        assert_eq!(got, vec![0, 1, 2]);
        tokio::time::timeout(WAIT, producer)
            .await
            .expect("done")
            .expect("join")
            .expect("sent");

        drop(stream);
        assert!(!ch.has_subscriber());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sends_through_activator() {
        let input = Arc::new(ReactiveChannel::<u32>::new("input"));
        let replies = Arc::new(QueueChannel::<String>::new("replies"));

        let activator = ServiceActivator::new("echo", |n: u32| {
            if n == 5 {
                Err(Intentional)
            } else {
                Ok(format!("reply-{n}"))
            }
        });
        let handler: Arc<dyn MessageHandler<u32>> = activator.into_arc();
        input
            .subscribe(HandlerSubscriber::<u32>::arc(handler))
            .await
            .expect("subscribe");

        let mut tasks = Vec::new();
        for n in 0..10_u32 {
            let input = Arc::clone(&input);
            let reply_to = ChannelRef::of(&replies);
            tasks.push(tokio::spawn(async move {
                let msg = Message::builder(n).reply_channel(reply_to).build();
                (n, input.send(msg).await)
            }));
        }

        let mut failed = Vec::new();
        let mut ok = 0;
        for task in tasks {
            let (n, res) = tokio::time::timeout(WAIT, task).await.expect("in time").expect("join");
            match res {
                Ok(()) => ok += 1,
                Err(err) => failed.push((n, err)),
            }
        }
        assert_eq!(ok, 9);
        assert_eq!(failed.len(), 1);
        let (n, err) = &failed[0];
        assert_eq!(*n, 5);
        let delivery = err.as_delivery().expect("delivery");
        assert_eq!(delivery.chain().count(), 3);
        assert!(err.to_string().contains("intentional"));

        let mut got = HashSet::new();
        while let Some(reply) = replies.try_receive() {
            got.insert(reply.into_payload());
        }
        let expected: HashSet<String> = (0..10_u32)
            .filter(|n| *n != 5)
            .map(|n| format!("reply-{n}"))
            .collect();
        assert_eq!(got, expected);
    }
}
