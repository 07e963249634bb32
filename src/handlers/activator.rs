//! # ServiceActivator: payload function with reply routing
//!
//! Applies a plain function to each message payload and forwards the result.
//!
//! ## Routing
//! ```text
//! Message<I> ──► f(payload) ──┬─ Err(e) ──► handler failure (cause = e)
//!                             └─ Ok(out) ──► output channel, if configured
//!                                            else the message's reply channel
//!                                            else ReplyError::NoDestination
//! ```
//!
//! The reply keeps the request's headers and gets a fresh id.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use fluxgate::{ChannelRef, Message, MessageHandler, PollableChannel, QueueChannel, ServiceActivator};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let replies = Arc::new(QueueChannel::<String>::new("replies"));
//! let to_text = ServiceActivator::new("to-text", |n: i32| Ok::<_, std::convert::Infallible>(n.to_string()));
//!
//! let msg = Message::builder(7).reply_channel(ChannelRef::of(&replies)).build();
//! to_text.handle_message(msg).await.unwrap();
//!
//! assert_eq!(replies.try_receive().map(|m| m.into_payload()), Some("7".to_string()));
//! # }
//! ```

use std::borrow::Cow;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::channels::MessageChannel;
use crate::error::{BoxError, ReplyError};
use crate::handlers::MessageHandler;
use crate::message::Message;

/// Handler applying `F: Fn(I) -> Result<O, E>` to each payload.
pub struct ServiceActivator<I, O: Send + 'static, F> {
    name: Cow<'static, str>,
    f: F,
    output: Option<Arc<dyn MessageChannel<O>>>,
    _io: PhantomData<fn(I) -> O>,
}

impl<I, O, F> ServiceActivator<I, O, F>
where
    O: Send + 'static,
{
    /// Creates an activator that replies to each message's reply channel.
    pub fn new<E>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn(I) -> Result<O, E>,
    {
        Self {
            name: name.into(),
            f,
            output: None,
            _io: PhantomData,
        }
    }

    /// Sends every result to `channel`, ignoring reply channels on messages.
    pub fn with_output_channel(mut self, channel: Arc<dyn MessageChannel<O>>) -> Self {
        self.output = Some(channel);
        self
    }

    /// Wraps the activator in an `Arc`.
    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn destination(&self, message: &Message<I>) -> Result<Arc<dyn MessageChannel<O>>, ReplyError> {
        if let Some(output) = &self.output {
            return Ok(Arc::clone(output));
        }
        let Some(reply_to) = message.reply_channel() else {
            return Err(ReplyError::NoDestination {
                handler: Arc::from(&*self.name),
            });
        };
        reply_to.resolve::<O>().ok_or_else(|| ReplyError::Unresolvable {
            handler: Arc::from(&*self.name),
            channel: reply_to.name().into(),
        })
    }
}

#[async_trait]
impl<I, O, F, E> MessageHandler<I> for ServiceActivator<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Result<O, E> + Send + Sync + 'static,
    E: Into<BoxError> + Send + 'static,
{
    async fn handle_message(&self, message: Message<I>) -> Result<(), BoxError> {
        let destination = self.destination(&message);
        let (payload, reply) = message.into_parts();

        let result = (self.f)(payload).map_err(Into::<BoxError>::into)?;
        let destination = destination?;

        debug!(handler = %self.name, reply_to = destination.name(), "routing result");
        destination.send(reply.payload(result).build()).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
