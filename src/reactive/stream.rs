//! # BridgeStream: a reactive channel consumed as a `Stream`.
//!
//! Each poll without a buffered item requests exactly one message, so the
//! stream applies the same backpressure as a hand-written subscriber calling
//! `request(1)` per element.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::{FutureExt, Stream};
use tokio::sync::mpsc;

use crate::error::BoxError;
use crate::message::Message;

use super::{Subscriber, Subscription};

/// Stream of messages from a [`ReactiveChannel`](crate::ReactiveChannel).
///
/// Ends when the channel is completed or the subscription is cancelled.
/// Dropping it cancels the subscription.
pub struct BridgeStream<T: Send + 'static> {
    subscription: Subscription<T>,
    rx: mpsc::UnboundedReceiver<Message<T>>,
    requesting: Option<BoxFuture<'static, ()>>,
    requested: bool,
}

/// Subscriber side of a [`BridgeStream`].
struct Feed<T> {
    tx: mpsc::UnboundedSender<Message<T>>,
}

#[async_trait]
impl<T: Send + 'static> Subscriber<T> for Feed<T> {
    async fn on_subscribe(&self, _subscription: Subscription<T>) {}

    async fn on_next(&self, message: Message<T>) -> Result<(), BoxError> {
        self.tx
            .send(message)
            .map_err(|_| BoxError::from("stream consumer dropped"))
    }

    fn name(&self) -> &str {
        "stream"
    }
}

impl<T: Send + 'static> BridgeStream<T> {
    pub(crate) fn feed() -> (Arc<dyn Subscriber<T>>, mpsc::UnboundedReceiver<Message<T>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let feed: Arc<dyn Subscriber<T>> = Arc::new(Feed { tx });
        (feed, rx)
    }

    pub(crate) fn new(subscription: Subscription<T>, rx: mpsc::UnboundedReceiver<Message<T>>) -> Self {
        Self {
            subscription,
            rx,
            requesting: None,
            requested: false,
        }
    }

    /// The underlying subscription.
    pub fn subscription(&self) -> &Subscription<T> {
        &self.subscription
    }

    /// Cancels the subscription; the stream ends after buffered items.
    pub fn cancel(&self) {
        self.subscription.cancel();
    }
}

impl<T: Send + 'static> Stream for BridgeStream<T> {
    type Item = Message<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Poll::Ready(item) = this.rx.poll_recv(cx) {
                if item.is_some() {
                    this.requested = false;
                }
                return Poll::Ready(item);
            }
            if let Some(fut) = this.requesting.as_mut() {
                if fut.poll_unpin(cx).is_pending() {
                    return Poll::Pending;
                }
                // The request may have emitted the parked message.
                this.requesting = None;
                continue;
            }
            if this.requested {
                return Poll::Pending;
            }
            this.requested = true;
            let subscription = this.subscription.clone();
            this.requesting = Some(async move { subscription.request(1).await }.boxed());
        }
    }
}

impl<T: Send + 'static> Drop for BridgeStream<T> {
    fn drop(&mut self) {
        self.subscription.cancel();
    }
}
