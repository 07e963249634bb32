//! # Channel addressing.
//!
//! A [`ChannelRef`] names a channel that can receive replies. It erases the
//! channel's payload type so that any [`Message`](crate::Message) can carry
//! one; the reply type is recovered with [`ChannelRef::resolve`].

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::channels::MessageChannel;

/// Type-erased, cloneable handle to a channel.
#[derive(Clone)]
pub struct ChannelRef {
    name: Arc<str>,
    target: Arc<dyn Any + Send + Sync>,
}

impl ChannelRef {
    /// Wraps a channel accepting messages with payload `T`.
    pub fn new<T: Send + 'static>(channel: Arc<dyn MessageChannel<T>>) -> Self {
        Self {
            name: channel.name().into(),
            target: Arc::new(channel),
        }
    }

    /// Wraps a concrete channel.
    ///
    /// ## Example
    /// ```rust
    /// use std::sync::Arc;
    /// use fluxgate::{ChannelRef, QueueChannel};
    ///
    /// let replies = Arc::new(QueueChannel::<String>::new("replies"));
    /// let reply_to = ChannelRef::of(&replies);
    ///
    /// assert_eq!(reply_to.name(), "replies");
    /// assert!(reply_to.resolve::<String>().is_some());
    /// assert!(reply_to.resolve::<u32>().is_none());
    /// ```
    pub fn of<T, C>(channel: &Arc<C>) -> Self
    where
        T: Send + 'static,
        C: MessageChannel<T>,
    {
        let channel: Arc<dyn MessageChannel<T>> = channel.clone();
        Self::new(channel)
    }

    /// Name of the referenced channel.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the channel if it accepts payload `T`.
    pub fn resolve<T: Send + 'static>(&self) -> Option<Arc<dyn MessageChannel<T>>> {
        self.target
            .downcast_ref::<Arc<dyn MessageChannel<T>>>()
            .cloned()
    }
}

impl fmt::Debug for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ChannelRef").field(&self.name).finish()
    }
}
