//! # PublishSubscribeChannel: synchronous broadcast to handlers.
//!
//! Every registered [`MessageHandler`] receives a clone of each message, in
//! registration order, on the sender's task.
//!
//! ## Diagram
//! ```text
//! send(msg)
//!    │  snapshot handlers
//!    ├──► handler 1.handle_message(msg.clone())  ─┐
//!    ├──► handler 2.handle_message(msg.clone())   ├─ first failure stops dispatch
//!    └──► handler N.handle_message(msg)          ─┘  and is returned to the sender
//! ```
//!
//! ## Rules
//! - Handlers registered after a send started do not see that message.
//! - No subscribers: the message is dropped and `send` succeeds.
//! - Panics inside handlers are caught and reported like errors.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, warn};

use crate::channels::{HandlerId, MessageChannel, SubscribableChannel};
use crate::error::{DeliveryError, HandlerPanic, HandlingError, SendError};
use crate::events::{Bus, Event, EventKind};
use crate::handlers::MessageHandler;
use crate::message::Message;

type Handlers<T> = Vec<(HandlerId, Arc<dyn MessageHandler<T>>)>;

/// Broadcasting channel with synchronous dispatch.
pub struct PublishSubscribeChannel<T: Send + 'static> {
    name: Arc<str>,
    handlers: RwLock<Handlers<T>>,
    next_id: AtomicU64,
    bus: Option<Bus>,
}

impl<T: Clone + Send + 'static> PublishSubscribeChannel<T> {
    /// Creates a channel with no subscribers.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            handlers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
            bus: None,
        }
    }

    /// Publishes delivery failures to `bus`.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Number of registered handlers.
    pub fn subscriber_count(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn snapshot(&self) -> Vec<Arc<dyn MessageHandler<T>>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect()
    }

    async fn dispatch(
        &self,
        handler: &Arc<dyn MessageHandler<T>>,
        message: Message<T>,
    ) -> Result<(), HandlingError> {
        let id = message.id();
        let fut = handler.handle_message(message);
        let cause = match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(cause)) => cause,
            Err(panic) => HandlerPanic::from_payload(panic.as_ref()).into(),
        };
        let err = HandlingError::new(handler.name(), cause);
        warn!(channel = %self.name, handler = handler.name(), message_id = id, error = %err, "handler failed");
        if let Some(bus) = &self.bus {
            bus.publish(
                Event::new(EventKind::DeliveryFailed)
                    .with_channel(Arc::clone(&self.name))
                    .with_subscriber(handler.name())
                    .with_message(id)
                    .with_reason(err.to_string()),
            );
        }
        Err(err)
    }
}

#[async_trait]
impl<T: Clone + Send + 'static> MessageChannel<T> for PublishSubscribeChannel<T> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: Message<T>) -> Result<(), SendError> {
        let handlers = self.snapshot();
        let Some((last, rest)) = handlers.split_last() else {
            debug!(channel = %self.name, message_id = message.id(), "no subscribers, message dropped");
            return Ok(());
        };

        for handler in rest {
            self.dispatch(handler, message.clone())
                .await
                .map_err(|e| DeliveryError::new(Arc::clone(&self.name), e))?;
        }
        self.dispatch(last, message)
            .await
            .map_err(|e| DeliveryError::new(Arc::clone(&self.name), e))?;
        Ok(())
    }
}

impl<T: Clone + Send + 'static> SubscribableChannel<T> for PublishSubscribeChannel<T> {
    fn subscribe(&self, handler: Arc<dyn MessageHandler<T>>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(channel = %self.name, handler = handler.name(), "handler subscribed");
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, handler));
        id
    }

    fn unsubscribe(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(hid, _)| *hid != id);
        let removed = handlers.len() != before;
        if removed {
            debug!(channel = %self.name, ?id, "handler unsubscribed");
        }
        removed
    }
}
