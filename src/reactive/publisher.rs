//! # Publisher adapter: existing channels as message streams.
//!
//! [`to_publisher`] turns a [`SubscribableChannel`] into a [`ChannelPublisher`];
//! every [`ChannelPublisher::subscribe`] registers a listener that forwards
//! each message into its own [`MessageStream`].
//!
//! ```text
//! channel.send(m) ──► listener A ──► MessageStream A
//!                 └─► listener B ──► MessageStream B
//! ```
//!
//! ## Rules
//! - Messages sent before a stream subscribed are not replayed.
//! - Demand is unbounded; forwarding never blocks the sender.
//! - `cancel()` or dropping the stream removes its listener and ends it.
//!
//! [`from_pollable`] adapts a [`PollableChannel`] instead: streams receive in a
//! loop, so each queued message goes to exactly one stream, including messages
//! queued before the stream existed.
//!
//! A [`ReactiveChannel`](crate::ReactiveChannel) is already demand-driven and
//! needs no adapter: [`subscribe_stream`](crate::ReactiveChannel::subscribe_stream)
//! gives its stream directly, with one message requested per poll.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use fluxgate::{Message, MessageChannel, PublishSubscribeChannel, to_publisher};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let channel = Arc::new(PublishSubscribeChannel::<&'static str>::new("greetings"));
//! let mut stream = to_publisher::<&str>(channel.clone()).subscribe();
//!
//! channel.send(Message::new("hello")).await.unwrap();
//! assert_eq!(stream.next().await.map(Message::into_payload), Some("hello"));
//! # }
//! ```

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::channels::{HandlerId, MessageChannel, PollableChannel, SubscribableChannel};
use crate::error::BoxError;
use crate::handlers::MessageHandler;
use crate::message::Message;

/// Exposes a subscribable channel as a publisher of message streams.
///
/// For a [`ReactiveChannel`](crate::ReactiveChannel) use
/// [`subscribe_stream`](crate::ReactiveChannel::subscribe_stream) instead.
pub fn to_publisher<T: Send + 'static>(channel: Arc<dyn SubscribableChannel<T>>) -> ChannelPublisher<T> {
    ChannelPublisher {
        source: Source::Subscribable(channel),
    }
}

/// Exposes a pollable channel as a publisher of message streams.
pub fn from_pollable<T: Send + 'static>(channel: Arc<dyn PollableChannel<T>>) -> ChannelPublisher<T> {
    ChannelPublisher {
        source: Source::Pollable(channel),
    }
}

enum Source<T: Send + 'static> {
    Subscribable(Arc<dyn SubscribableChannel<T>>),
    Pollable(Arc<dyn PollableChannel<T>>),
}

/// Publisher backed by a channel. See [`to_publisher`] and [`from_pollable`].
pub struct ChannelPublisher<T: Send + 'static> {
    source: Source<T>,
}

impl<T: Send + 'static> ChannelPublisher<T> {
    /// Name of the underlying channel.
    pub fn channel_name(&self) -> &str {
        match &self.source {
            Source::Subscribable(ch) => ch.name(),
            Source::Pollable(ch) => ch.name(),
        }
    }

    /// Starts a new stream of messages from the channel.
    pub fn subscribe(&self) -> MessageStream<T> {
        match &self.source {
            Source::Subscribable(channel) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let listener: Arc<dyn MessageHandler<T>> = Arc::new(Forward {
                    tx,
                    name: format!("{}-publisher", channel.name()),
                });
                let id = channel.subscribe(listener);
                debug!(channel = channel.name(), ?id, "publisher stream subscribed");
                MessageStream {
                    inner: Inner::Listener {
                        channel: Arc::clone(channel),
                        id: Some(id),
                        rx,
                    },
                }
            }
            Source::Pollable(channel) => {
                let polled = stream::unfold(Arc::clone(channel), |channel| async move {
                    let message = channel.receive(None).await?;
                    Some((message, channel))
                });
                MessageStream {
                    inner: Inner::Polling {
                        stream: Some(polled.boxed()),
                    },
                }
            }
        }
    }
}

/// Listener forwarding channel messages into a stream.
struct Forward<T> {
    tx: mpsc::UnboundedSender<Message<T>>,
    name: String,
}

#[async_trait]
impl<T: Send + 'static> MessageHandler<T> for Forward<T> {
    async fn handle_message(&self, message: Message<T>) -> Result<(), BoxError> {
        // The stream may be gone between its drop and the unsubscribe.
        let _ = self.tx.send(message);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

enum Inner<T: Send + 'static> {
    Listener {
        channel: Arc<dyn SubscribableChannel<T>>,
        id: Option<HandlerId>,
        rx: mpsc::UnboundedReceiver<Message<T>>,
    },
    Polling {
        stream: Option<BoxStream<'static, Message<T>>>,
    },
}

/// Stream of messages produced by a [`ChannelPublisher`].
pub struct MessageStream<T: Send + 'static> {
    inner: Inner<T>,
}

impl<T: Send + 'static> MessageStream<T> {
    /// Stops the stream. No further messages are observed. Idempotent.
    pub fn cancel(&mut self) {
        match &mut self.inner {
            Inner::Listener { channel, id, rx } => {
                if let Some(id) = id.take() {
                    channel.unsubscribe(id);
                    debug!(channel = channel.name(), ?id, "publisher stream cancelled");
                }
                rx.close();
            }
            Inner::Polling { stream } => {
                stream.take();
            }
        }
    }

    /// True once the stream was cancelled.
    pub fn is_cancelled(&self) -> bool {
        match &self.inner {
            Inner::Listener { id, .. } => id.is_none(),
            Inner::Polling { stream } => stream.is_none(),
        }
    }
}

impl<T: Send + 'static> Stream for MessageStream<T> {
    type Item = Message<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match &mut self.get_mut().inner {
            Inner::Listener { id: None, .. } => Poll::Ready(None),
            Inner::Listener { rx, .. } => rx.poll_recv(cx),
            Inner::Polling { stream: Some(s) } => s.poll_next_unpin(cx),
            Inner::Polling { stream: None } => Poll::Ready(None),
        }
    }
}

impl<T: Send + 'static> Drop for MessageStream<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}
