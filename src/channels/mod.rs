//! # Message channels.
//!
//! ## Capabilities
//! - [`MessageChannel`] send
//! - [`PollableChannel`] buffered, drained with `receive`
//! - [`SubscribableChannel`] pushes to registered [`MessageHandler`](crate::MessageHandler)s
//!
//! ## Implementations
//! - [`QueueChannel`] FIFO point-to-point queue (pollable)
//! - [`PublishSubscribeChannel`] broadcast to handlers (subscribable)
//! - [`ReactiveChannel`](crate::ReactiveChannel) demand-driven bridge (see `reactive`)

mod channel;
mod publish_subscribe;
mod queue;

pub use channel::{HandlerId, MessageChannel, PollableChannel, SubscribableChannel};
pub use publish_subscribe::PublishSubscribeChannel;
pub use queue::QueueChannel;
