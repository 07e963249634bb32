//! # Reactive bridging.
//!
//! - [`ReactiveChannel`] push-style `send` into one demand-driven [`Subscriber`]
//! - [`Subscription`] request / cancel handle given to the subscriber
//! - [`HandlerSubscriber`] any [`MessageHandler`](crate::MessageHandler) as a subscriber with unbounded demand
//! - [`BridgeStream`] a reactive channel consumed as a `futures::Stream`
//! - [`to_publisher`] / [`from_pollable`] existing channels exposed as [`MessageStream`]s

mod bridge;
mod publisher;
mod stream;
mod subscriber;
mod subscription;

pub use bridge::ReactiveChannel;
pub use publisher::{ChannelPublisher, MessageStream, from_pollable, to_publisher};
pub use stream::BridgeStream;
pub use subscriber::{HandlerSubscriber, Subscriber};
pub use subscription::{Demand, Subscription, SubscriptionState};
