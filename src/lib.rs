//! # fluxgate
//!
//! **Fluxgate** provides reactive message channels for tokio applications.
//!
//! Its centerpiece is [`ReactiveChannel`], a bridge that lets any number of
//! producers push messages with `send` into one demand-driven consumer, with
//! backpressure instead of unbounded buffering. Around it sit the usual
//! messaging building blocks: a message envelope, queue and publish-subscribe
//! channels, handlers, and an adapter that exposes channels as streams.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  producer  producer  producer
//!     │         │         │   send(Message<T>)
//!     ▼         ▼         ▼
//! ┌──────────────────────────────────────────────┐
//! │  ReactiveChannel                             │
//! │  - gate: one admission permit (FIFO)         │
//! │  - pending slot: at most one parked message  │
//! │  - single active Subscription (demand)       │──► Bus ──► LogWriter (tracing)
//! └──────────────────────┬───────────────────────┘
//!                        │ on_next(message)   ▲ request(n) / cancel()
//!                        ▼                    │
//!                 ┌──────────────────────────────┐
//!                 │  Subscriber                  │
//!                 │  (HandlerSubscriber,         │
//!                 │   BridgeStream, custom)      │
//!                 └──────────────────────────────┘
//! ```
//!
//! ### Failure propagation
//! ```text
//! subscriber fails ──► HandlingError { handler, cause }
//!                   ──► DeliveryError { channel, HandlingError }
//!                   ──► SendError::Delivery returned to the sender of that message
//!
//! sender already gone ──► Subscriber::on_error, subscription becomes Errored
//! ```
//!
//! ## Features
//! | Area            | Description                                                     | Key types                                          |
//! |-----------------|-----------------------------------------------------------------|----------------------------------------------------|
//! | **Messages**    | Immutable envelope with headers and reply address               | [`Message`], [`MessageBuilder`], [`ChannelRef`]    |
//! | **Channels**    | Send / poll / subscribe capabilities and concrete channels      | [`MessageChannel`], [`QueueChannel`], [`PublishSubscribeChannel`] |
//! | **Bridge**      | Backpressured push-to-pull channel                              | [`ReactiveChannel`], [`Subscriber`], [`Subscription`] |
//! | **Publishers**  | Existing channels as `futures::Stream`s                         | [`to_publisher`], [`from_pollable`], [`MessageStream`] |
//! | **Handlers**    | Closures and payload functions with reply routing              | [`HandlerFn`], [`ServiceActivator`]                |
//! | **Events**      | Runtime events on a broadcast bus, written to `tracing`         | [`Bus`], [`Event`], [`LogWriter`]                  |
//! | **Errors**      | Typed, layered errors                                           | [`SendError`], [`DeliveryError`], [`HandlingError`] |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use fluxgate::{
//!     BoxError, Bus, ChannelRef, HandlerSubscriber, LogWriter, Message, MessageChannel,
//!     PollableChannel, QueueChannel, ReactiveChannel, ServiceActivator,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), BoxError> {
//!     let bus = Bus::new(64);
//!     let _log = LogWriter::new().spawn(&bus);
//!
//!     let input = ReactiveChannel::<u32>::new("input").with_bus(bus);
//!     let replies = Arc::new(QueueChannel::<String>::new("replies"));
//!
//!     let square = ServiceActivator::new("square", |n: u32| {
//!         n.checked_mul(n).map(|sq| sq.to_string()).ok_or("overflow")
//!     });
//!     input.subscribe(HandlerSubscriber::<u32>::arc(square.into_arc())).await?;
//!
//!     let msg = Message::builder(12).reply_channel(ChannelRef::of(&replies)).build();
//!     input.send(msg).await?;
//!
//!     let reply = replies.try_receive().map(Message::into_payload);
//!     assert_eq!(reply.as_deref(), Some("144"));
//!     Ok(())
//! }
//! ```

mod channels;
mod config;
mod error;
mod events;
mod handlers;
mod message;
mod reactive;

// ---- Public re-exports ----

pub use channels::{
    HandlerId, MessageChannel, PollableChannel, PublishSubscribeChannel, QueueChannel,
    SubscribableChannel,
};
pub use config::ChannelConfig;
pub use error::{
    BoxError, DeliveryError, HandlerPanic, HandlingError, ReplyError, SendError, SubscribeError,
};
pub use events::{Bus, Event, EventKind, LogWriter};
pub use handlers::{HandlerFn, MessageHandler, ServiceActivator};
pub use message::{ChannelRef, Headers, Message, MessageBuilder};
pub use reactive::{
    BridgeStream, ChannelPublisher, Demand, HandlerSubscriber, MessageStream, ReactiveChannel,
    Subscriber, Subscription, SubscriptionState, from_pollable, to_publisher,
};
