//! # Channel capabilities.
//!
//! - [`MessageChannel`]: anything you can `send` to.
//! - [`PollableChannel`]: a channel that buffers and is drained with `receive`.
//! - [`SubscribableChannel`]: a channel that pushes to registered handlers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::SendError;
use crate::handlers::MessageHandler;
use crate::message::Message;

/// Identifier returned by [`SubscribableChannel::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub(crate) u64);

/// Contract for channels accepting messages with payload `T`.
#[async_trait]
pub trait MessageChannel<T: Send + 'static>: Send + Sync + 'static {
    /// Channel name (for logs and error messages).
    fn name(&self) -> &str;

    /// Sends a message, waiting as long as the channel's configuration allows.
    async fn send(&self, message: Message<T>) -> Result<(), SendError>;

    /// Sends a message, failing with [`SendError::Timeout`] after `timeout`.
    ///
    /// `Duration::ZERO` is a real deadline: the send fails unless the message
    /// is accepted at once. This differs from
    /// [`ChannelConfig::send_timeout`](crate::ChannelConfig::send_timeout),
    /// where zero means "no deadline" for [`send`](MessageChannel::send).
    ///
    /// The default implementation bounds [`send`](MessageChannel::send) as a whole.
    async fn send_timeout(&self, message: Message<T>, timeout: Duration) -> Result<(), SendError> {
        match tokio::time::timeout(timeout, self.send(message)).await {
            Ok(res) => res,
            Err(_elapsed) => Err(SendError::Timeout {
                channel: self.name().into(),
                timeout,
            }),
        }
    }
}

/// Contract for buffering channels drained by receivers.
#[async_trait]
pub trait PollableChannel<T: Send + 'static>: MessageChannel<T> {
    /// Waits for the next message.
    ///
    /// - `None` timeout waits indefinitely
    /// - returns `None` when the timeout elapses first
    async fn receive(&self, timeout: Option<Duration>) -> Option<Message<T>>;

    /// Takes the next message if one is buffered; never waits.
    fn try_receive(&self) -> Option<Message<T>>;
}

/// Contract for channels that dispatch to registered handlers.
pub trait SubscribableChannel<T: Send + 'static>: MessageChannel<T> {
    /// Registers a handler; it sees every message sent from now on.
    fn subscribe(&self, handler: Arc<dyn MessageHandler<T>>) -> HandlerId;

    /// Removes a handler. Returns `false` if it was not registered.
    fn unsubscribe(&self, id: HandlerId) -> bool;
}
