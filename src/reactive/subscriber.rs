//! # Demand-driven consumers.
//!
//! [`Subscriber`] is the consumer side of a [`ReactiveChannel`](crate::ReactiveChannel).
//! [`HandlerSubscriber`] adapts any [`MessageHandler`] into one with unbounded demand.

use std::error::Error as StdError;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BoxError;
use crate::handlers::MessageHandler;
use crate::message::Message;

use super::Subscription;

/// # Consumer attached to a reactive channel.
///
/// Callbacks are never invoked concurrently for the same subscription: the
/// channel emits one message at a time.
///
/// An error returned by [`on_next`](Subscriber::on_next) is reported to the
/// sender of that message. [`on_error`](Subscriber::on_error) only sees
/// failures nobody else could observe.
#[async_trait]
pub trait Subscriber<T: Send + 'static>: Send + Sync + 'static {
    /// Called once when the subscription is attached. Request demand here.
    async fn on_subscribe(&self, subscription: Subscription<T>);

    /// Handles one message.
    async fn on_next(&self, message: Message<T>) -> Result<(), BoxError>;

    /// The subscription ended because of `error`.
    async fn on_error(&self, _error: &(dyn StdError + Send + Sync + 'static)) {}

    /// The channel was completed.
    async fn on_complete(&self) {}

    /// Human-readable name (for logs and error messages).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Subscriber delegating every message to a [`MessageHandler`].
pub struct HandlerSubscriber<T: Send + 'static> {
    handler: Arc<dyn MessageHandler<T>>,
}

impl<T: Send + 'static> HandlerSubscriber<T> {
    /// Wraps `handler`.
    pub fn new(handler: Arc<dyn MessageHandler<T>>) -> Self {
        Self { handler }
    }

    /// Wraps `handler` and returns a shared handle.
    pub fn arc(handler: Arc<dyn MessageHandler<T>>) -> Arc<Self> {
        Arc::new(Self::new(handler))
    }
}

#[async_trait]
impl<T: Send + 'static> Subscriber<T> for HandlerSubscriber<T> {
    async fn on_subscribe(&self, subscription: Subscription<T>) {
        subscription.request_unbounded().await;
    }

    async fn on_next(&self, message: Message<T>) -> Result<(), BoxError> {
        self.handler.handle_message(message).await
    }

    fn name(&self) -> &str {
        self.handler.name()
    }
}
