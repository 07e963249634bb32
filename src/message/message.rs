//! # Immutable message envelope.
//!
//! A [`Message`] carries a payload, string headers, and an optional reply
//! address ([`ChannelRef`]). Each message gets a process-unique id and a
//! timestamp at construction; nothing is mutated afterwards.
//!
//! ## Example
//! ```rust
//! use fluxgate::Message;
//!
//! let msg = Message::builder(42)
//!     .header("source", "sensor-7")
//!     .build();
//!
//! assert_eq!(*msg.payload(), 42);
//! assert_eq!(msg.header("source"), Some("sensor-7"));
//! assert!(msg.reply_channel().is_none());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use super::ChannelRef;

/// Global counter for message ids.
static MESSAGE_SEQ: AtomicU64 = AtomicU64::new(1);

/// Message headers (string key → string value).
pub type Headers = HashMap<String, String>;

/// Immutable message: payload plus metadata.
#[derive(Clone)]
pub struct Message<T> {
    id: u64,
    timestamp: SystemTime,
    payload: T,
    headers: Headers,
    reply_channel: Option<ChannelRef>,
}

impl<T> Message<T> {
    /// Creates a message with no headers and no reply channel.
    pub fn new(payload: T) -> Self {
        MessageBuilder::new(payload).build()
    }

    /// Starts building a message around `payload`.
    pub fn builder(payload: T) -> MessageBuilder<T> {
        MessageBuilder::new(payload)
    }

    /// Process-unique, increasing id.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Creation time.
    #[inline]
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Borrows the payload.
    #[inline]
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Consumes the message and returns the payload.
    #[inline]
    pub fn into_payload(self) -> T {
        self.payload
    }

    /// Returns a header value.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// All headers.
    #[inline]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Where replies to this message should go, if anywhere.
    #[inline]
    pub fn reply_channel(&self) -> Option<&ChannelRef> {
        self.reply_channel.as_ref()
    }

    /// Splits the message into payload and a builder primed with its headers and reply channel.
    ///
    /// Used to build a reply that keeps the request's metadata.
    pub fn into_parts(self) -> (T, MessageBuilder<()>) {
        let builder = MessageBuilder {
            payload: (),
            headers: self.headers,
            reply_channel: self.reply_channel,
        };
        (self.payload, builder)
    }
}

impl<T: fmt::Debug> fmt::Debug for Message<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("payload", &self.payload)
            .field("headers", &self.headers)
            .field("reply_channel", &self.reply_channel)
            .finish()
    }
}

/// Builder for [`Message`].
#[must_use]
pub struct MessageBuilder<T> {
    payload: T,
    headers: Headers,
    reply_channel: Option<ChannelRef>,
}

impl<T> MessageBuilder<T> {
    /// Starts a builder around `payload`.
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            headers: Headers::new(),
            reply_channel: None,
        }
    }

    /// Sets a header (replaces an existing value).
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Sets the reply channel.
    pub fn reply_channel(mut self, channel: ChannelRef) -> Self {
        self.reply_channel = Some(channel);
        self
    }

    /// Replaces the payload, keeping headers and reply channel.
    pub fn payload<U>(self, payload: U) -> MessageBuilder<U> {
        MessageBuilder {
            payload,
            headers: self.headers,
            reply_channel: self.reply_channel,
        }
    }

    /// Finalizes the message, assigning its id and timestamp.
    pub fn build(self) -> Message<T> {
        Message {
            id: MESSAGE_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            timestamp: SystemTime::now(),
            payload: self.payload,
            headers: self.headers,
            reply_channel: self.reply_channel,
        }
    }
}
