//! Message model: the immutable envelope and reply addressing.
//!
//! - [`Message`] payload + headers + optional reply channel
//! - [`MessageBuilder`] builder for messages
//! - [`ChannelRef`] type-erased reply address

mod channel_ref;
#[allow(clippy::module_inception)]
mod message;

pub use channel_ref::ChannelRef;
pub use message::{Headers, Message, MessageBuilder};
